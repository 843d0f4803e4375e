//! MIT OpenCourseWare scraper.
//!
//! Walks the department listing pages, follows course links whose text names
//! a core math subject, and downloads every PDF linked from the course page.
//! The course name doubles as the abstract so lecture files with terse link
//! text ("Lecture 3") still get classified sensibly.

use super::{Link, ScrapeContext, ScrapeError, Source, extract_links};
use crate::models::Candidate;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::{error, info, instrument};
use url::Url;

pub const NAME: &str = "mit_ocw";

const BASE_URL: &str = "https://ocw.mit.edu";

pub const DEPARTMENTS: &[&str] = &[
    "/courses/mathematics/",
    "/courses/electrical-engineering-and-computer-science/",
];

const COURSE_TERMS: &[&str] = &["calculus", "algebra", "analysis", "topology", "geometry"];

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// The MIT OpenCourseWare source.
#[derive(Debug, Clone)]
pub struct MitOcw {
    base_url: String,
}

impl Default for MitOcw {
    fn default() -> Self {
        Self::with_base_url(BASE_URL)
    }
}

impl MitOcw {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    #[instrument(level = "info", skip_all, fields(course = %course.url))]
    async fn scrape_course(&self, ctx: &ScrapeContext<'_>, course: &Link) -> Result<(), ScrapeError> {
        let html = ctx.fetch_text(course.url.as_str()).await?;
        let pdfs = pdf_links(&html, &course.url);
        info!(count = pdfs.len(), course = %course.text, "Found course PDFs");

        for pdf in pdfs {
            let title = pdf.title();
            let candidate = Candidate::new(title.clone(), course.text.clone(), pdf.url.as_str(), ctx.source())
                .with_file_stem(format!("mit_{title}"));
            ctx.offer(candidate).await;
            if !ctx.item_pause().await {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Source for MitOcw {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(level = "info", skip_all, fields(source = NAME))]
    async fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<(), ScrapeError> {
        let base = Url::parse(&self.base_url)?;

        for dept in DEPARTMENTS {
            if ctx.is_cancelled() {
                break;
            }
            let url = base.join(dept)?;
            info!(%url, "Searching MIT OCW");

            match ctx.fetch_text(url.as_str()).await {
                Ok(html) => {
                    let courses = course_links(&html, &url);
                    info!(count = courses.len(), "Matched MIT OCW courses");
                    for course in &courses {
                        if ctx.is_cancelled() {
                            return Ok(());
                        }
                        if let Err(e) = self.scrape_course(ctx, course).await {
                            error!(course = %course.url, error = %e, "Error processing MIT OCW course");
                        }
                        if !ctx.item_pause().await {
                            return Ok(());
                        }
                    }
                }
                Err(e) => error!(%url, error = %e, "Error scraping MIT OCW"),
            }

            if !ctx.term_pause().await {
                break;
            }
        }
        Ok(())
    }
}

/// Course links on a department page whose anchor text names a math subject.
pub fn course_links(html: &str, page: &Url) -> Vec<Link> {
    extract_links(html, page, &ANCHORS)
        .into_iter()
        .filter(|l| l.url.path().contains("/courses/"))
        .filter(|l| {
            let text = l.text.to_lowercase();
            COURSE_TERMS.iter().any(|t| text.contains(t))
        })
        .collect()
}

/// Links on a course page whose path ends in `.pdf`.
pub fn pdf_links(html: &str, page: &Url) -> Vec<Link> {
    extract_links(html, page, &ANCHORS)
        .into_iter()
        .filter(|l| l.url.path().to_ascii_lowercase().ends_with(".pdf"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Throttle;
    use crate::download::Downloader;
    use crate::test_support::{Route, TestServer, test_client};
    use tokio_util::sync::CancellationToken;

    const DEPT_PAGE: &str = r#"<html><body>
        <a href="/courses/18-01-single-variable-calculus/">18.01 Single Variable Calculus</a>
        <a href="/courses/18-650-statistics/">18.650 Statistics for Applications</a>
        <a href="/about/">About OCW: calculus and more</a>
    </body></html>"#;

    const COURSE_PAGE: &str = r#"<html><body>
        <a href="lec1.pdf">Lecture 1: Derivatives</a>
        <a href="/courses/18-01-single-variable-calculus/notes.PDF"></a>
        <a href="syllabus/">Syllabus</a>
    </body></html>"#;

    #[test]
    fn test_course_links_filter_by_subject() {
        let page = Url::parse("https://ocw.mit.edu/courses/mathematics/").unwrap();
        let courses = course_links(DEPT_PAGE, &page);
        assert_eq!(courses.len(), 1);
        assert_eq!(
            courses[0].url.as_str(),
            "https://ocw.mit.edu/courses/18-01-single-variable-calculus/"
        );
    }

    #[test]
    fn test_pdf_links_resolve_relative_to_course() {
        let page = Url::parse("https://ocw.mit.edu/courses/18-01-single-variable-calculus/").unwrap();
        let pdfs = pdf_links(COURSE_PAGE, &page);
        assert_eq!(pdfs.len(), 2);
        assert_eq!(
            pdfs[0].url.as_str(),
            "https://ocw.mit.edu/courses/18-01-single-variable-calculus/lec1.pdf"
        );
        assert_eq!(pdfs[1].title(), "notes.PDF");
    }

    #[tokio::test]
    async fn test_scrape_downloads_course_pdfs() {
        let server = TestServer::spawn(vec![
            Route::html("/courses/mathematics/", DEPT_PAGE),
            Route::html("/courses/18-01-single-variable-calculus/", COURSE_PAGE),
            Route::pdf("/courses/18-01-single-variable-calculus/lec1.pdf", b"%PDF lec1".to_vec()),
            Route::pdf("/courses/18-01-single-variable-calculus/notes.PDF", b"%PDF notes".to_vec()),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let downloader = Downloader::new(test_client(), tmp.path(), cancel.clone());
        let ctx = ScrapeContext::new(NAME, &downloader, Throttle::none(), &cancel, None);

        MitOcw::with_base_url(server.base_url()).scrape(&ctx).await.unwrap();

        assert_eq!(ctx.downloaded(), 2);
        let dir = tmp.path().join("calculus").join(NAME);
        assert!(dir.join("mit_Lecture 1 Derivatives.pdf").exists());
        assert!(dir.join("mit_notes.PDF").exists());
        // the second department 404s without aborting the scraper
        assert_eq!(
            server.hits("/courses/electrical-engineering-and-computer-science/"),
            1
        );
    }
}
