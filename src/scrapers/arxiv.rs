//! arXiv scraper using the public export API.
//!
//! One Atom query per math category, restricted to entries mentioning
//! "textbook" or "lecture notes". The API is sloppy about that filter, so
//! abstracts are checked again locally before anything is downloaded.
//!
//! # URL Pattern
//!
//! PDF links in the feed look like `http://arxiv.org/pdf/2301.12345v1`; the
//! `.pdf` extension is appended when missing. Entries without a PDF link fall
//! back to their `/abs/` id rewritten to `/pdf/`.

use super::{ScrapeContext, ScrapeError, Source};
use crate::models::Candidate;
use crate::utils::normalize_ws;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

pub const NAME: &str = "arxiv";

const API_URL: &str = "http://export.arxiv.org/api/query";

/// Categories searched, with a human-readable label for logging.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("math.AG", "Algebraic Geometry"),
    ("math.AT", "Algebraic Topology"),
    ("math.RA", "Rings and Algebras"),
    ("math.GT", "Geometric Topology"),
    ("math.NT", "Number Theory"),
    ("math.FA", "Functional Analysis"),
    ("math.CA", "Classical Analysis"),
    ("math.OA", "Operator Algebras"),
    ("math.RT", "Representation Theory"),
    ("math.QA", "Quantum Algebra"),
    ("math.DG", "Differential Geometry"),
    ("math.AP", "Analysis of PDEs"),
    ("math.PR", "Probability Theory"),
    ("math.ST", "Statistics Theory"),
    ("math.LO", "Logic"),
];

const COURSE_MARKERS: &[&str] = &["textbook", "lecture notes", "course notes", "introduction to"];

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
}

/// One feed entry that is worth downloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivPaper {
    pub title: String,
    pub summary: String,
    pub pdf_url: String,
}

/// The arXiv source.
#[derive(Debug, Clone)]
pub struct Arxiv {
    api_url: String,
}

impl Default for Arxiv {
    fn default() -> Self {
        Self::with_api_url(API_URL)
    }
}

impl Arxiv {
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl Source for Arxiv {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(level = "info", skip_all, fields(source = NAME))]
    async fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<(), ScrapeError> {
        for (category, description) in CATEGORIES {
            if ctx.is_cancelled() {
                break;
            }
            info!(%category, %description, "Searching arXiv");

            match ctx.fetch_text(&query_url(&self.api_url, category)).await {
                Ok(body) => match parse_feed(&body) {
                    Ok(papers) => {
                        info!(%category, count = papers.len(), "Parsed arXiv feed");
                        for paper in papers {
                            let stem = format!("{}_{}", category, paper.title);
                            let candidate =
                                Candidate::new(paper.title, paper.summary, paper.pdf_url, ctx.source())
                                    .with_file_stem(stem);
                            ctx.offer(candidate).await;
                            if !ctx.item_pause().await {
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => error!(%category, error = %e, "Error parsing arXiv feed"),
                },
                Err(e) => error!(%category, error = %e, "Error scraping arXiv"),
            }

            if !ctx.term_pause().await {
                break;
            }
        }
        Ok(())
    }
}

/// Export API query for textbook-like entries in one category.
pub fn query_url(api_url: &str, category: &str) -> String {
    format!(
        "{api_url}?search_query=cat:{category}+AND+%28%22textbook%22+OR+%22lecture+notes%22%29&start=0&max_results=50&sortBy=relevance"
    )
}

/// Parse an Atom feed into course-like papers with a usable PDF URL.
///
/// Entries without a title, without course markers in the abstract, or
/// without any way to derive a PDF URL are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivPaper>, quick_xml::DeError> {
    let feed: Feed = quick_xml::de::from_str(xml)?;
    let papers = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = normalize_ws(&entry.title);
            let summary = normalize_ws(&entry.summary);
            if title.is_empty() || !is_course_material(&summary) {
                return None;
            }
            let Some(pdf_url) = pdf_url(&entry) else {
                warn!(%title, "arXiv entry has no PDF link");
                return None;
            };
            Some(ArxivPaper {
                title,
                summary,
                pdf_url,
            })
        })
        .collect();
    Ok(papers)
}

/// Whether an abstract reads like teaching material.
pub fn is_course_material(summary: &str) -> bool {
    let lower = summary.to_lowercase();
    COURSE_MARKERS.iter().any(|m| lower.contains(m))
}

fn pdf_url(entry: &Entry) -> Option<String> {
    let href = entry
        .links
        .iter()
        .find(|l| l.title.as_deref() == Some("pdf"))
        .map(|l| l.href.trim().to_string())
        .or_else(|| {
            let id = entry.id.trim();
            id.contains("/abs/").then(|| id.to_string())
        })?;
    Some(normalize_pdf_url(&href))
}

/// Point `/abs/` URLs at `/pdf/` and make sure the path ends in `.pdf`.
pub fn normalize_pdf_url(href: &str) -> String {
    if href.ends_with(".pdf") {
        href.to_string()
    } else {
        format!("{}.pdf", href.replace("/abs/", "/pdf/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Throttle;
    use crate::download::Downloader;
    use crate::test_support::{Route, TestServer, test_client};
    use tokio_util::sync::CancellationToken;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query</title>
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">3</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/2301.00001v1</id>
    <title>Lecture Notes on
      Algebraic Topology</title>
    <summary>  These lecture notes cover homotopy &amp; homology.
    </summary>
    <author><name>A. Author</name></author>
    <link title="doi" href="http://dx.doi.org/10.1000/xyz" rel="related"/>
    <arxiv:comment>120 pages</arxiv:comment>
    <link href="http://arxiv.org/abs/2301.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2301.00001v1" rel="related" type="application/pdf"/>
    <category term="math.AT" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2301.00002v2</id>
    <title>A new bound for widgets</title>
    <summary>We prove a sharp bound.</summary>
    <link title="pdf" href="http://arxiv.org/pdf/2301.00002v2" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2301.00003v1</id>
    <title>Probability</title>
    <summary>An introduction to measure-theoretic probability.</summary>
  </entry>
</feed>"#;

    #[tokio::test]
    async fn test_scrape_names_files_by_category() {
        let server = TestServer::spawn_with(|base| {
            vec![
                Route::xml("/api/query", &FEED.replace("http://arxiv.org", base)),
                Route::pdf("/pdf/2301.00001v1.pdf", b"%PDF topology".to_vec()),
                Route::pdf("/pdf/2301.00003v1.pdf", b"%PDF probability".to_vec()),
            ]
        });
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let downloader = Downloader::new(test_client(), tmp.path(), cancel.clone());
        let ctx = ScrapeContext::new(NAME, &downloader, Throttle::none(), &cancel, None);

        Arxiv::with_api_url(server.url("/api/query")).scrape(&ctx).await.unwrap();

        // every category returns the same feed; each paper is fetched once
        assert_eq!(server.hits("/api/query"), CATEGORIES.len());
        assert_eq!(ctx.downloaded(), 2);
        assert!(
            tmp.path()
                .join("algebra")
                .join(NAME)
                .join("math.AG_Lecture Notes on Algebraic Topology.pdf")
                .exists()
        );
    }

    #[test]
    fn test_parse_feed_keeps_course_material() {
        let papers = parse_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        assert_eq!(papers[0].title, "Lecture Notes on Algebraic Topology");
        assert_eq!(
            papers[0].summary,
            "These lecture notes cover homotopy & homology."
        );
        assert_eq!(papers[0].pdf_url, "http://arxiv.org/pdf/2301.00001v1.pdf");

        // no pdf link: derived from the abs id
        assert_eq!(papers[1].pdf_url, "http://arxiv.org/pdf/2301.00003v1.pdf");
    }

    #[test]
    fn test_parse_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        assert!(parse_feed("<feed><entry><title>unterminated").is_err());
    }

    #[test]
    fn test_normalize_pdf_url() {
        assert_eq!(
            normalize_pdf_url("http://arxiv.org/abs/1234.5678"),
            "http://arxiv.org/pdf/1234.5678.pdf"
        );
        assert_eq!(
            normalize_pdf_url("http://arxiv.org/pdf/1234.5678v2.pdf"),
            "http://arxiv.org/pdf/1234.5678v2.pdf"
        );
    }

    #[test]
    fn test_is_course_material() {
        assert!(is_course_material("A TEXTBOOK for beginners"));
        assert!(is_course_material("Course notes from a graduate seminar"));
        assert!(!is_course_material("We prove a sharp bound."));
    }

    #[test]
    fn test_query_url_targets_category() {
        let url = query_url(API_URL, "math.NT");
        assert!(url.starts_with(API_URL));
        assert!(url.contains("cat:math.NT"));
        assert!(url.contains("max_results=50"));
    }
}
