//! # Math PDF Harvester
//!
//! Collects freely available mathematics PDFs (textbooks, lecture notes,
//! open course material) from public catalogs and files them by subject.
//!
//! ## Features
//!
//! - Scrapes arXiv, MIT OpenCourseWare, Project Gutenberg, the Open Textbook
//!   Library, OER Commons and MERLOT
//! - Classifies each document into a math field by keyword
//! - Downloads each URL at most once per run, with progress reporting
//! - Writes a JSON run report next to the downloads
//!
//! ## Usage
//!
//! ```sh
//! math_pdf_harvester -d ./math_books -s arxiv,gutenberg
//! ```
//!
//! ## Architecture
//!
//! 1. **Selection**: resolve source tokens against the registry
//! 2. **Scraping**: each source discovers candidates, one request at a time
//! 3. **Download**: candidates are classified, named and streamed to
//!    `<root>/<field>/<source>/`
//! 4. **Output**: the run summary is logged and written to `download_report.json`
//!
//! The harvest runs on its own task and reports back over a channel; Ctrl-C
//! cancels it cooperatively and removes any partially written file.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

mod classify;
mod cli;
mod config;
mod download;
mod harvest;
mod logging;
mod models;
mod outputs;
mod scrapers;
#[cfg(test)]
mod test_support;
mod utils;

use cli::Cli;
use config::HarvestConfig;
use harvest::Harvester;
use models::RunEvent;
use outputs::json;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Cli::parse();
    logging::init(args.log_file.as_deref().map(Path::new))?;

    let start_time = std::time::Instant::now();
    info!("math_pdf_harvester starting up");
    debug!(?args, "Parsed CLI arguments");

    let config = HarvestConfig::from_cli(&args)?;
    debug!(?config, "Effective configuration");

    // Early check: ensure the download root is writable
    if let Err(e) = ensure_writable_dir(&config.download_dir).await {
        error!(
            path = %config.download_dir.display(),
            error = %e,
            "Download directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Cancellation ----
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current request");
                cancel.cancel();
            }
        }
    });

    // ---- Harvest on a worker task ----
    let (tx, mut rx) = mpsc::unbounded_channel();
    let harvester = Harvester::new(&config, cancel, Some(tx))?;
    let selected = config.sources.clone();
    let started_at = Utc::now();
    let worker = tokio::spawn(async move { harvester.run(selected.as_deref()).await });

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::SourceStarted { source } => info!(%source, "Harvesting source"),
            RunEvent::Progress { filename, percent } => {
                debug!(%filename, percent = %format!("{percent:.0}%"), "Download progress")
            }
            RunEvent::Downloaded(record) => info!(
                filename = %record.filename,
                field = %record.field,
                source = %record.source_name,
                bytes = record.bytes_written,
                "Saved PDF"
            ),
            RunEvent::SourceFinished { source, downloaded } => {
                debug!(%source, downloaded, "Source done")
            }
            RunEvent::Finished { .. } => break,
        }
    }

    let summary = worker.await?;
    let finished_at = Utc::now();

    for tally in &summary.per_source {
        info!(source = %tally.source, downloaded = tally.downloaded, "Per-source total");
    }

    // ---- Run report ----
    if config.write_report {
        if let Err(e) = json::write_report(&summary, started_at, finished_at, &config.download_dir).await {
            error!(error = %e, "Failed to write run report");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        downloaded = summary.downloaded,
        cancelled = summary.cancelled,
        "math_pdf_harvester finished"
    );

    Ok(())
}
