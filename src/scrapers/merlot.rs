//! MERLOT scraper.
//!
//! Searches the mathematics category for open textbooks. Material pages
//! rarely link a PDF directly; the "Go to Material" button is the usual way
//! out, so when nothing on the page looks like a download the outbound
//! material links are checked with HEAD as a last resort.

use super::{Link, ScrapeContext, ScrapeError, Source, extract_links, parse_detail};
use crate::models::Candidate;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::{debug, error, info, instrument};
use url::Url;

pub const NAME: &str = "merlot";

const SEARCH_URL: &str =
    "https://www.merlot.org/merlot/materials.htm?category=2513&materialType=Open%20Textbook&keywords=";

pub const SEARCH_TERMS: &[&str] = &["calculus", "algebra", "geometry", "probability", "analysis"];

static MATERIAL_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="viewMaterial.htm"]"#).unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2.title, h1").unwrap());
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".material-description, #material-description").unwrap());

/// The MERLOT source.
#[derive(Debug, Clone)]
pub struct Merlot {
    search_url: String,
}

impl Default for Merlot {
    fn default() -> Self {
        Self::with_search_url(SEARCH_URL)
    }
}

impl Merlot {
    pub fn with_search_url(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    #[instrument(level = "info", skip_all, fields(material = %material.url))]
    async fn scrape_material(&self, ctx: &ScrapeContext<'_>, material: &Link) -> Result<(), ScrapeError> {
        let html = ctx.fetch_text(material.url.as_str()).await?;
        let detail = parse_detail(&html, &material.url, &TITLE, &DESCRIPTION);
        let title = detail.title.unwrap_or_else(|| material.title());

        let pdf = match ctx.find_pdf_link(&detail.links).await {
            Some(link) => Some(link),
            None => self.check_material_links(ctx, &detail.links).await,
        };
        let Some(pdf) = pdf else {
            debug!(%title, "Material has no PDF");
            return Ok(());
        };

        let candidate = Candidate::new(title.clone(), detail.description, pdf.url.as_str(), ctx.source())
            .with_file_stem(format!("merlot_{title}"));
        ctx.offer(candidate).await;
        Ok(())
    }

    async fn check_material_links<'l>(&self, ctx: &ScrapeContext<'_>, links: &'l [Link]) -> Option<&'l Link> {
        for link in links.iter().filter(|l| is_material_button(l)) {
            if ctx.is_cancelled() {
                return None;
            }
            if ctx.head_is_pdf(link.url.as_str()).await {
                return Some(link);
            }
        }
        None
    }
}

#[async_trait]
impl Source for Merlot {
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
            info!(%term, "Searching MERLOT");

            let materials = match ctx.fetch_text(page.as_str()).await {
                Ok(html) => material_links(&html, &page),
                Err(e) => {
                    error!(%term, error = %e, "Error searching MERLOT");
                    Vec::new()
                }
            };
            info!(%term, count = materials.len(), "MERLOT hits");

            for material in &materials {
                if let Err(e) = self.scrape_material(ctx, material).await {
                    error!(material = %material.url, error = %e, "Error processing MERLOT material");
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

/// Material detail pages on a search results page.
pub fn material_links(html: &str, page: &Url) -> Vec<Link> {
    extract_links(html, page, &MATERIAL_LINKS)
}

fn is_material_button(link: &Link) -> bool {
    let text = link.text.to_lowercase();
    text.contains("go to material") || text.contains("view material")
}
