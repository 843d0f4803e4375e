//! Deduplicated, progressive PDF download manager.
//!
//! The [`Downloader`] owns the run's deduplication set and the shared HTTP
//! client. Every download follows the same path:
//!
//! 1. **Reserve** the URL. URLs already downloaded (or currently being
//!    fetched) are rejected without touching the network.
//! 2. **Fetch** with a streaming GET. Transport errors and non-2xx statuses
//!    fail the item.
//! 3. **Write** the body to `<root>/<field>/<source>/<filename>.part` in fixed
//!    [`CHUNK_SIZE`] chunks, reporting progress when the size is known.
//! 4. **Verify** the file is non-empty, rename it into place, then record the URL.
//!
//! File names are claimed per directory for the whole run. A second document
//! whose title sanitizes to a name already taken gets `<stem> (2).pdf`, and so on.
//!
//! Failures of any kind (including cancellation) remove the `.part` file and
//! release both the URL and the name. A file that is already in place is never
//! touched by a failed download. Nothing in here returns an error to the caller:
//! one bad download never aborts a run.

use crate::models::{DownloadRecord, Field};
use crate::utils::{numbered_filename, sanitize_filename};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Size of each write to disk, and the granularity of progress reports.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Some catalogs refuse requests that don't look like they come from a browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Progress callback: `(filename, percent)` with percent in `0.0..=100.0`.
pub type ProgressFn = Arc<dyn Fn(&str, f64) + Send + Sync>;

/// Why a single download failed.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(StatusCode),
    #[error("file system error: {0}")]
    Io(#[from] std::io::Error),
    #[error("downloaded file was empty")]
    Empty,
    #[error("download cancelled")]
    Cancelled,
}

/// Build the HTTP client shared by scrapers and the downloader.
///
/// Every request carries the browser-like `User-Agent` and `Accept` headers.
/// `timeout` bounds connecting and each wait for more body bytes; a large
/// PDF that keeps arriving is never cut off by it.
pub fn build_client(timeout: Duration, user_agent: &str) -> reqwest::Result<Client> {
    client_builder(timeout, user_agent).build()
}

pub fn client_builder(timeout: Duration, user_agent: &str) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .connect_timeout(timeout)
        .read_timeout(timeout)
}

#[derive(Debug, Default)]
struct Ledger {
    done: HashSet<String>,
    in_flight: HashSet<String>,
    /// Destination paths handed out this run, finished or in flight.
    claimed: HashSet<PathBuf>,
    records: Vec<DownloadRecord>,
}

/// Removes the file at `path` on drop unless [`PartialFile::keep`] was called.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial file"),
        }
    }
}

/// Downloads PDFs into the field/source directory tree, at most once per URL.
pub struct Downloader {
    client: Client,
    root: PathBuf,
    ledger: Mutex<Ledger>,
    progress: Option<ProgressFn>,
    page_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("root", &self.root)
            .field("downloaded", &self.downloaded_count())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Downloader {
    pub fn new(client: Client, root: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            client,
            root: root.into(),
            ledger: Mutex::new(Ledger::default()),
            progress: None,
            page_timeout: None,
            cancel,
        }
    }

    /// Deadline for whole page and HEAD requests made through [`Downloader::client`].
    /// Downloads themselves are only bounded by the client's read timeout.
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = Some(timeout);
        self
    }

    pub fn page_timeout(&self) -> Option<Duration> {
        self.page_timeout
    }

    /// Register a callback invoked while files are written.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of distinct URLs downloaded so far in this run.
    pub fn downloaded_count(&self) -> usize {
        self.ledger().done.len()
    }

    /// Whether `url` has already been downloaded in this run.
    pub fn contains(&self, url: &str) -> bool {
        self.ledger().done.contains(url)
    }

    /// Records of every successful download, in completion order.
    pub fn records(&self) -> Vec<DownloadRecord> {
        self.ledger().records.clone()
    }

    /// The record of the download of `url`, if it succeeded this run.
    pub fn record(&self, url: &str) -> Option<DownloadRecord> {
        self.ledger().records.iter().rev().find(|r| r.url == url).cloned()
    }

    /// Download `url` and report success as a plain flag.
    pub async fn download(&self, url: &str, filename: &str, field: Field, source_name: &str) -> bool {
        self.download_record(url, filename, field, source_name)
            .await
            .is_some()
    }

    /// Download `url` into `<root>/<field>/<source_name>/<sanitized filename>`.
    ///
    /// # Returns
    ///
    /// The new [`DownloadRecord`], or `None` if the URL was already
    /// downloaded or the download failed for any reason (the reason is logged).
    #[instrument(level = "info", skip_all, fields(%url, %field, source = %source_name))]
    async fn download_record(
        &self,
        url: &str,
        filename: &str,
        field: Field,
        source_name: &str,
    ) -> Option<DownloadRecord> {
        if !self.reserve(url) {
            debug!("URL already downloaded this run; skipping");
            return None;
        }

        let dir = self.root.join(field.as_str()).join(source_name);
        let filename = self.claim_name(&dir, &sanitize_filename(filename));
        match self.fetch_to_disk(url, &dir, &filename).await {
            Ok(bytes_written) => {
                let record = DownloadRecord {
                    url: url.to_string(),
                    field,
                    source_name: source_name.to_string(),
                    filename,
                    bytes_written,
                };
                self.commit(record.clone());
                info!(file = %record.filename, bytes = bytes_written, "Successfully downloaded");
                Some(record)
            }
            Err(e) => {
                self.release(url);
                self.release_name(&dir.join(&filename));
                match e {
                    DownloadError::Cancelled => warn!(file = %filename, "Download cancelled"),
                    DownloadError::Empty => error!(file = %filename, "Downloaded file was empty"),
                    other => error!(error = %other, "Error downloading"),
                }
                None
            }
        }
    }

    async fn fetch_to_disk(&self, url: &str, dir: &Path, filename: &str) -> Result<u64, DownloadError> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        debug!("Attempting to download");
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        fs::create_dir_all(dir).await?;
        let path = dir.join(filename);
        let part = dir.join(format!("{filename}.part"));

        let expected = response.content_length().filter(|n| *n > 0);
        if let Some(total) = expected {
            info!(size_mb = %format!("{:.2}", total as f64 / 1024.0 / 1024.0), "File size");
        }

        let mut guard = PartialFile::new(part.clone());
        let mut file = fs::File::create(&part).await?;
        let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE * 2);
        let mut written: u64 = 0;
        let mut last_percent: Option<f64> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(bytes) = next else { break };
            pending.extend_from_slice(&bytes);

            while pending.len() >= CHUNK_SIZE {
                file.write_all(&pending[..CHUNK_SIZE]).await?;
                pending.drain(..CHUNK_SIZE);
                written += CHUNK_SIZE as u64;
                self.report(filename, written, expected, &mut last_percent);
            }
        }
        if !pending.is_empty() {
            file.write_all(&pending).await?;
            written += pending.len() as u64;
            self.report(filename, written, expected, &mut last_percent);
        }
        file.flush().await?;
        drop(file);

        let on_disk = fs::metadata(&part).await?.len();
        if on_disk == 0 {
            return Err(DownloadError::Empty);
        }
        fs::rename(&part, &path).await?;
        guard.keep();

        if let Some(progress) = &self.progress {
            if last_percent != Some(100.0) {
                progress(filename, 100.0);
            }
        }
        debug!(path = %path.display(), written, "Wrote file");
        Ok(on_disk)
    }

    fn report(&self, filename: &str, written: u64, expected: Option<u64>, last: &mut Option<f64>) {
        let (Some(progress), Some(total)) = (&self.progress, expected) else {
            return;
        };
        let percent = (written as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
        progress(filename, percent);
        *last = Some(percent);
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reserve(&self, url: &str) -> bool {
        let mut ledger = self.ledger();
        if ledger.done.contains(url) || ledger.in_flight.contains(url) {
            return false;
        }
        ledger.in_flight.insert(url.to_string());
        true
    }

    fn commit(&self, record: DownloadRecord) {
        let mut ledger = self.ledger();
        ledger.in_flight.remove(&record.url);
        ledger.done.insert(record.url.clone());
        ledger.records.push(record);
    }

    fn release(&self, url: &str) {
        self.ledger().in_flight.remove(url);
    }

    /// Claim the first name in `dir` not handed out this run: `filename`, then
    /// `stem (2).pdf`, and so on. Files from earlier runs are replaced on success.
    fn claim_name(&self, dir: &Path, filename: &str) -> String {
        let mut ledger = self.ledger();
        let mut n = 1;
        loop {
            let candidate = if n == 1 {
                filename.to_string()
            } else {
                numbered_filename(filename, n)
            };
            if ledger.claimed.insert(dir.join(&candidate)) {
                return candidate;
            }
            n += 1;
        }
    }

    fn release_name(&self, path: &Path) {
        self.ledger().claimed.remove(path);
    }
}
