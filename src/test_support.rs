//! Local HTTP fixtures for tests.
//!
//! A `tiny_http` server on an ephemeral port serves canned routes and counts
//! the requests it receives per path, so tests can assert how many fetches
//! actually reached the network.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A canned response for one path (query strings are ignored when matching).
#[derive(Debug, Clone)]
pub struct Route {
    pub path: String,
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    /// Serve the body in pieces of this many bytes, sleeping before each one.
    pub pace: Option<(usize, Duration)>,
}

impl Route {
    pub fn new(path: &str, status: u16, body: Vec<u8>, content_type: &'static str) -> Self {
        Self {
            path: path.to_string(),
            status,
            body,
            content_type,
            pace: None,
        }
    }

    /// Trickle the body out in `piece`-byte writes separated by `delay`.
    /// Pieces of at least 8 KiB get past tiny_http's write buffer as they are sent.
    pub fn paced(mut self, piece: usize, delay: Duration) -> Self {
        self.pace = Some((piece.max(1), delay));
        self
    }

    pub fn pdf(path: &str, body: Vec<u8>) -> Self {
        Self::new(path, 200, body, "application/pdf")
    }

    pub fn html(path: &str, body: &str) -> Self {
        Self::new(path, 200, body.as_bytes().to_vec(), "text/html; charset=utf-8")
    }

    pub fn xml(path: &str, body: &str) -> Self {
        Self::new(path, 200, body.as_bytes().to_vec(), "application/atom+xml")
    }
}

/// A body reader that sleeps before handing out each piece.
struct PacedBody {
    body: Vec<u8>,
    pos: usize,
    piece: usize,
    delay: Duration,
}

impl PacedBody {
    fn new(body: Vec<u8>, piece: usize, delay: Duration) -> Self {
        Self {
            body,
            pos: 0,
            piece,
            delay,
        }
    }
}

impl Read for PacedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.body.len() || buf.is_empty() {
            return Ok(0);
        }
        if self.pos % self.piece == 0 {
            thread::sleep(self.delay);
        }
        let piece_end = (self.pos / self.piece + 1) * self.piece;
        let end = piece_end.min(self.body.len()).min(self.pos + buf.len());
        let n = end - self.pos;
        buf[..n].copy_from_slice(&self.body[self.pos..end]);
        self.pos = end;
        Ok(n)
    }
}

pub struct TestServer {
    base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn spawn(routes: Vec<Route>) -> Self {
        Self::spawn_with(|_| routes)
    }

    /// Like [`TestServer::spawn`], for fixtures that embed absolute URLs
    /// pointing back at the server.
    pub fn spawn_with(routes: impl FnOnce(&str) -> Vec<Route>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let routes = routes(&base_url);
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let counter = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(20)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url).to_string();
                *counter.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                let _ = match routes.iter().find(|r| r.path == path) {
                    Some(route) => {
                        let header = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            route.content_type.as_bytes(),
                        )
                        .unwrap();
                        match route.pace {
                            Some((piece, delay)) => request.respond(tiny_http::Response::new(
                                tiny_http::StatusCode(route.status),
                                vec![header],
                                PacedBody::new(route.body.clone(), piece, delay),
                                Some(route.body.len()),
                                None,
                            )),
                            None => request.respond(
                                tiny_http::Response::from_data(route.body.clone())
                                    .with_status_code(route.status)
                                    .with_header(header),
                            ),
                        }
                    }
                    None => request
                        .respond(tiny_http::Response::from_data(b"not found".to_vec()).with_status_code(404)),
                };
            }
        });

        Self {
            base_url,
            hits,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Requests received for `path` (any method).
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// HTTP client for tests: no proxy, short timeout.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("build test client")
}
