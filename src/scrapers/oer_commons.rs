//! OER Commons scraper.
//!
//! Searches the catalog with the mathematics subject filter applied.
//! Resource pages link out to the hosting site through a "View Resource"
//! button; direct `.pdf` links win, anything else hinting at a download is
//! checked with HEAD first.

use super::{Link, ScrapeContext, ScrapeError, Source, extract_links, parse_detail};
use crate::models::Candidate;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::{debug, error, info, instrument};
use url::Url;

pub const NAME: &str = "oer_commons";

const SEARCH_URL: &str = "https://www.oercommons.org/search?f.general_subject=mathematics&f.search=";

pub const SEARCH_TERMS: &[&str] = &[
    "calculus textbook",
    "linear algebra",
    "geometry",
    "probability and statistics",
    "number theory",
];

static RESULT_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".item-title a[href], a.item-link[href]").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".material-title, h1").unwrap());
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".abstract, .material-abstract, .description").unwrap());

/// The OER Commons source.
#[derive(Debug, Clone)]
pub struct OerCommons {
    search_url: String,
}

impl Default for OerCommons {
    fn default() -> Self {
        Self::with_search_url(SEARCH_URL)
    }
}

impl OerCommons {
    pub fn with_search_url(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    #[instrument(level = "info", skip_all, fields(resource = %item.url))]
    async fn scrape_resource(&self, ctx: &ScrapeContext<'_>, item: &Link) -> Result<(), ScrapeError> {
        let html = ctx.fetch_text(item.url.as_str()).await?;
        let detail = parse_detail(&html, &item.url, &TITLE, &DESCRIPTION);
        let title = detail.title.unwrap_or_else(|| item.title());

        let Some(pdf) = ctx.find_pdf_link(&detail.links).await else {
            debug!(%title, "Resource has no PDF");
            return Ok(());
        };
        let candidate = Candidate::new(title.clone(), detail.description, pdf.url.as_str(), ctx.source())
            .with_file_stem(format!("oer_{title}"));
        ctx.offer(candidate).await;
        Ok(())
    }
}

#[async_trait]
impl Source for OerCommons {
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
            info!(%term, "Searching OER Commons");

            let items = match ctx.fetch_text(page.as_str()).await {
                Ok(html) => result_links(&html, &page),
                Err(e) => {
                    error!(%term, error = %e, "Error searching OER Commons");
                    Vec::new()
                }
            };
            info!(%term, count = items.len(), "OER Commons hits");

            for item in &items {
                if let Err(e) = self.scrape_resource(ctx, item).await {
                    error!(resource = %item.url, error = %e, "Error processing OER Commons resource");
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

/// Resource pages on a search results page, restricted to the catalog's host.
pub fn result_links(html: &str, page: &Url) -> Vec<Link> {
    extract_links(html, page, &RESULT_LINKS)
        .into_iter()
        .filter(|l| l.url.host_str() == page.host_str())
        .collect()
}
