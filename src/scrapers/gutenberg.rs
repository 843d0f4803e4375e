//! Project Gutenberg scraper.
//!
//! Runs a handful of catalog searches and visits each `.booklink` hit. Only
//! the first PDF that actually downloads is kept per book; Gutenberg often
//! lists several renderings of the same text.

use super::{Link, ScrapeContext, ScrapeError, Source, element_text, extract_links};
use crate::models::Candidate;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, error, info, instrument};
use url::Url;

pub const NAME: &str = "gutenberg";

const SEARCH_URL: &str = "https://www.gutenberg.org/ebooks/search/?query=";

pub const SEARCH_TERMS: &[&str] = &[
    "mathematics textbook",
    "geometry textbook",
    "algebra textbook",
    "calculus textbook",
];

static BOOKLINK: Lazy<Selector> = Lazy::new(|| Selector::parse(".booklink").unwrap());
static BOOK_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".title").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// A search hit: the book's title and its detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookHit {
    pub title: String,
    pub url: Url,
}

/// The Project Gutenberg source.
#[derive(Debug, Clone)]
pub struct Gutenberg {
    search_url: String,
}

impl Default for Gutenberg {
    fn default() -> Self {
        Self::with_search_url(SEARCH_URL)
    }
}

impl Gutenberg {
    /// `search_url` is the search endpoint up to and including `query=`.
    pub fn with_search_url(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    #[instrument(level = "info", skip_all, fields(book = %book.url))]
    async fn scrape_book(&self, ctx: &ScrapeContext<'_>, book: &BookHit) -> Result<(), ScrapeError> {
        let html = ctx.fetch_text(book.url.as_str()).await?;
        let pdfs = pdf_links(&html, &book.url);
        debug!(count = pdfs.len(), "Book PDF links");
        if pdfs.iter().any(|l| ctx.already_downloaded(l.url.as_str())) {
            debug!("Book already downloaded this run");
            return Ok(());
        }

        for pdf in pdfs {
            let candidate = Candidate::new(book.title.clone(), "", pdf.url.as_str(), ctx.source())
                .with_file_stem(format!("gutenberg_{}", book.title));
            if ctx.offer(candidate).await {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Source for Gutenberg {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(level = "info", skip_all, fields(source = NAME))]
    async fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<(), ScrapeError> {
        for term in SEARCH_TERMS {
            if ctx.is_cancelled() {
                break;
            }
            let page = Url::parse(&format!("{}{}", self.search_url, urlencoding::encode(term)))?;
            info!(%term, "Searching Project Gutenberg");

            let hits = match ctx.fetch_text(page.as_str()).await {
                Ok(html) => book_hits(&html, &page),
                Err(e) => {
                    error!(%term, error = %e, "Error searching Project Gutenberg");
                    Vec::new()
                }
            };
            info!(%term, count = hits.len(), "Project Gutenberg hits");

            for book in &hits {
                if let Err(e) = self.scrape_book(ctx, book).await {
                    error!(book = %book.url, error = %e, "Error processing Gutenberg book");
                }
                if !ctx.item_pause().await {
                    return Ok(());
                }
            }

            if !ctx.term_pause().await {
                break;
            }
        }
        Ok(())
    }
}

/// Books listed on a search results page.
pub fn book_hits(html: &str, page: &Url) -> Vec<BookHit> {
    let document = Html::parse_document(html);
    document
        .select(&BOOKLINK)
        .filter_map(|booklink| {
            let title = booklink.select(&BOOK_TITLE).next().map(|t| element_text(&t))?;
            let href = booklink.select(&ANCHOR).next()?.value().attr("href")?;
            let url = page.join(href).ok()?;
            (!title.is_empty()).then_some(BookHit { title, url })
        })
        .collect()
}

/// Links to PDF files on a book's detail page.
pub fn pdf_links(html: &str, page: &Url) -> Vec<Link> {
    extract_links(html, page, &ANCHOR)
        .into_iter()
        .filter(|l| l.url.path().ends_with(".pdf"))
        .collect()
}
