//! Source scrapers for discovering mathematics PDFs in public catalogs.
//!
//! Each submodule targets one catalog and implements [`Source`]. Scrapers
//! follow the same shape:
//!
//! 1. **Listing**: walk a fixed list of search terms or categories
//! 2. **Detail**: visit each hit and locate a plausible PDF link
//! 3. **Offer**: hand a [`Candidate`] to [`ScrapeContext::offer`], which
//!    classifies it, names the file and downloads it
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | arXiv | [`arxiv`] | Atom export API | Textbook / lecture-note queries per category |
//! | MIT OpenCourseWare | [`mit_ocw`] | HTML scraping | Course pages under the math department |
//! | Project Gutenberg | [`gutenberg`] | HTML scraping | First PDF per book |
//! | Open Textbook Library | [`open_textbook`] | HTML scraping | PDF links confirmed with HEAD |
//! | OER Commons | [`oer_commons`] | HTML scraping | Mathematics subject filter |
//! | MERLOT | [`merlot`] | HTML scraping | Mathematics category, open textbooks |
//!
//! # Common Patterns
//!
//! - Requests go one at a time through the shared client, paced by the
//!   run's [`Throttle`]
//! - Failures are logged per item and per term and never escape `scrape`
//!   except for setup problems
//! - HTML is parsed into owned [`Link`]s before the next `await`, so no
//!   parser state is held across suspension points

pub mod arxiv;
pub mod gutenberg;
pub mod merlot;
pub mod mit_ocw;
pub mod oer_commons;
pub mod open_textbook;

use crate::classify::classify;
use crate::config::Throttle;
use crate::download::Downloader;
use crate::models::{Candidate, RunEvent};
use crate::utils::{normalize_ws, truncate_for_log};
use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use reqwest::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Error type for scraper setup and request failures.
pub type ScrapeError = Box<dyn Error + Send + Sync>;

/// One external catalog.
#[async_trait]
pub trait Source: Send + Sync {
    /// Token used for selection and as the source directory name.
    fn name(&self) -> &'static str;

    /// Discover candidates and offer them for download.
    ///
    /// Per-item failures must be handled inside; an `Err` here means the
    /// scraper could not start at all.
    async fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<(), ScrapeError>;
}

/// Instantiate every built-in source, in default run order.
pub fn registry() -> Vec<Box<dyn Source>> {
    vec![
        Box::new(arxiv::Arxiv::default()),
        Box::new(mit_ocw::MitOcw::default()),
        Box::new(gutenberg::Gutenberg::default()),
        Box::new(open_textbook::OpenTextbook::default()),
        Box::new(oer_commons::OerCommons::default()),
        Box::new(merlot::Merlot::default()),
    ]
}

/// Everything a scraper needs during one run of one source.
pub struct ScrapeContext<'a> {
    source: &'static str,
    downloader: &'a Downloader,
    throttle: Throttle,
    cancel: &'a CancellationToken,
    events: Option<&'a UnboundedSender<RunEvent>>,
    downloaded: AtomicUsize,
}

impl<'a> ScrapeContext<'a> {
    pub fn new(
        source: &'static str,
        downloader: &'a Downloader,
        throttle: Throttle,
        cancel: &'a CancellationToken,
        events: Option<&'a UnboundedSender<RunEvent>>,
    ) -> Self {
        Self {
            source,
            downloader,
            throttle,
            cancel,
            events,
            downloaded: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn client(&self) -> &Client {
        self.downloader.client()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether `url` was already downloaded earlier in the run.
    pub fn already_downloaded(&self, url: &str) -> bool {
        self.downloader.contains(url)
    }

    /// Files downloaded through this context.
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Classify, name and download a candidate.
    ///
    /// # Returns
    ///
    /// `true` if a new file was written.
    pub async fn offer(&self, candidate: Candidate) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let field = classify(&candidate.title, &candidate.abstract_text);
        info!(
            source = %candidate.source_name,
            %field,
            title = %truncate_for_log(&candidate.title, 80),
            url = %candidate.source_url,
            "Classified candidate"
        );

        let written = self
            .downloader
            .download(
                &candidate.source_url,
                candidate.raw_filename(),
                field,
                &candidate.source_name,
            )
            .await;
        if !written {
            return false;
        }
        self.downloaded.fetch_add(1, Ordering::Relaxed);
        if let (Some(events), Some(record)) = (self.events, self.downloader.record(&candidate.source_url)) {
            let _ = events.send(RunEvent::Downloaded(record));
        }
        true
    }

    /// Pause after an item. Returns `false` if the run was cancelled meanwhile.
    pub async fn item_pause(&self) -> bool {
        self.pause(self.throttle.item_delay).await
    }

    /// Pause after a search term or category.
    pub async fn term_pause(&self) -> bool {
        self.pause(self.throttle.term_delay).await
    }

    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Apply the run's page deadline, if any.
    fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        match self.downloader.page_timeout() {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// GET `url` and return the body as text; non-2xx statuses are errors.
    pub async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        debug!(%url, "Fetching page");
        let response = self
            .bounded(self.client().get(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// HEAD `url` and check whether it serves a PDF.
    ///
    /// HEAD checks are not paced by the throttle; the download that follows a
    /// positive answer is.
    pub async fn head_is_pdf(&self, url: &str) -> bool {
        match self.bounded(self.client().head(url)).send().await {
            Ok(resp) if resp.status().is_success() => {
                let is_pdf = resp
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/pdf"));
                debug!(%url, is_pdf, "HEAD check");
                is_pdf
            }
            Ok(resp) => {
                debug!(%url, status = %resp.status(), "HEAD check rejected");
                false
            }
            Err(e) => {
                warn!(%url, error = %e, "HEAD check failed");
                false
            }
        }
    }

    /// First link in `links` that serves a PDF: an explicit `.pdf` link wins,
    /// otherwise links hinting at a download are checked with HEAD in order.
    pub async fn find_pdf_link<'l>(&self, links: &'l [Link]) -> Option<&'l Link> {
        if let Some(link) = links.iter().find(|l| looks_like_pdf(l.url.as_str())) {
            return Some(link);
        }
        for link in links.iter().filter(|l| l.hints_download()) {
            if self.is_cancelled() {
                return None;
            }
            if self.head_is_pdf(link.url.as_str()).await {
                return Some(link);
            }
        }
        None
    }
}

/// Heuristic: does the URL look like it points at a PDF?
pub fn looks_like_pdf(url: &str) -> bool {
    url.to_ascii_lowercase().contains(".pdf")
}

/// An anchor resolved against its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: Url,
    /// Whitespace-normalized anchor text.
    pub text: String,
}

impl Link {
    /// Anchor text, or the last path segment when the anchor has no text.
    pub fn title(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|segment| segment.trim_end_matches(".pdf").to_string())
            .unwrap_or_default()
    }

    /// Whether the anchor text or URL suggests a downloadable file.
    pub fn hints_download(&self) -> bool {
        let text = self.text.to_lowercase();
        let url = self.url.as_str().to_ascii_lowercase();
        text.contains("pdf")
            || text.contains("download")
            || url.contains("download")
            || url.contains("/pdf")
    }
}

/// What a catalog's item page tells us about one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    pub title: Option<String>,
    /// Description block, falling back to `<meta name="description">`.
    pub description: String,
    /// Every http(s) link on the page.
    pub links: Vec<Link>,
}

static ANY_ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#).unwrap());

/// Parse an item page with site-specific title and description selectors.
pub fn parse_detail(html: &str, page: &Url, title: &Selector, description: &Selector) -> DetailPage {
    DetailPage {
        title: first_text(html, title),
        description: first_text(html, description)
            .or_else(|| meta_content(html, &META_DESCRIPTION))
            .unwrap_or_default(),
        links: extract_links(html, page, &ANY_ANCHOR),
    }
}

/// Whitespace-normalized text content of an element.
pub fn element_text(element: &ElementRef<'_>) -> String {
    normalize_ws(&element.text().collect::<Vec<_>>().join(" "))
}

/// Collect `href`s of elements matching `selector`, resolved against `base`.
///
/// Links that fail to resolve or are not http(s) are dropped; duplicates
/// (same URL) keep their first occurrence.
pub fn extract_links(html: &str, base: &Url, selector: &Selector) -> Vec<Link> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let url = base.join(href.trim()).ok()?;
            matches!(url.scheme(), "http" | "https").then(|| Link {
                url,
                text: element_text(&el),
            })
        })
        .unique_by(|l| l.url.clone())
        .collect()
}

/// Text of the first element matching `selector`, if any and non-empty.
pub fn first_text(html: &str, selector: &Selector) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

/// `content` of the first `<meta>` matching `selector`.
pub fn meta_content(html: &str, selector: &Selector) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(normalize_ws)
        .find(|t| !t.is_empty())
}
