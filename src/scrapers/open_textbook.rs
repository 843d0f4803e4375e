//! Open Textbook Library scraper.
//!
//! The library at `open.umn.edu` lists complete textbooks with a format
//! menu on each book page. Format links frequently point at redirectors
//! rather than `.pdf` files, so anything that looks like a download is
//! confirmed with a HEAD request before fetching.

use super::{Link, ScrapeContext, ScrapeError, Source, extract_links, parse_detail};
use crate::models::Candidate;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::{debug, error, info, instrument};
use url::Url;

pub const NAME: &str = "open_textbook";

const SEARCH_URL: &str = "https://open.umn.edu/opentextbooks/textbooks?term=";

const BOOK_PATH_PREFIX: &str = "/opentextbooks/textbooks/";

pub const SEARCH_TERMS: &[&str] = &[
    "calculus",
    "algebra",
    "geometry",
    "statistics",
    "differential equations",
    "discrete mathematics",
];

static BOOK_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="/opentextbooks/textbooks/"]"#).unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("#info h1, h1").unwrap());
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#AboutBook p, .about-book p, .description").unwrap());

/// The Open Textbook Library source.
#[derive(Debug, Clone)]
pub struct OpenTextbook {
    search_url: String,
}

impl Default for OpenTextbook {
    fn default() -> Self {
        Self::with_search_url(SEARCH_URL)
    }
}

impl OpenTextbook {
    pub fn with_search_url(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    #[instrument(level = "info", skip_all, fields(book = %book.url))]
    async fn scrape_book(&self, ctx: &ScrapeContext<'_>, book: &Link) -> Result<(), ScrapeError> {
        let html = ctx.fetch_text(book.url.as_str()).await?;
        let detail = parse_detail(&html, &book.url, &TITLE, &DESCRIPTION);
        let title = detail.title.unwrap_or_else(|| book.text.clone());

        let Some(pdf) = ctx.find_pdf_link(&detail.links).await else {
            debug!(%title, "No PDF format offered");
            return Ok(());
        };
        let candidate = Candidate::new(title.clone(), detail.description, pdf.url.as_str(), ctx.source())
            .with_file_stem(format!("otl_{title}"));
        ctx.offer(candidate).await;
        Ok(())
    }
}

#[async_trait]
impl Source for OpenTextbook {
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
            info!(%term, "Searching Open Textbook Library");

            let books = match ctx.fetch_text(page.as_str()).await {
                Ok(html) => book_links(&html, &page),
                Err(e) => {
                    error!(%term, error = %e, "Error searching Open Textbook Library");
                    Vec::new()
                }
            };
            info!(%term, count = books.len(), "Open Textbook Library hits");

            for book in &books {
                if let Err(e) = self.scrape_book(ctx, book).await {
                    error!(book = %book.url, error = %e, "Error processing Open Textbook Library book");
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

/// Book pages linked from a search results page.
///
/// Only direct children of the textbook path count, which drops review and
/// pagination links.
pub fn book_links(html: &str, page: &Url) -> Vec<Link> {
    extract_links(html, page, &BOOK_LINKS)
        .into_iter()
        .filter(|l| {
            l.url
                .path()
                .strip_prefix(BOOK_PATH_PREFIX)
                .is_some_and(|slug| !slug.is_empty() && !slug.contains('/'))
        })
        .filter(|l| l.url.query().is_none())
        .collect()
}
