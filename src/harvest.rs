//! Run orchestration: selects sources, runs them in turn, and tallies results.

use crate::config::{HarvestConfig, Throttle};
use crate::download::{Downloader, ProgressFn, build_client};
use crate::models::{DownloadRecord, RunEvent};
use crate::scrapers::{ScrapeContext, Source, registry};
use futures::FutureExt;
use itertools::Itertools;
use reqwest::Client;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// New files contributed by one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTally {
    pub source: String,
    pub downloaded: usize,
}

/// Outcome of [`Harvester::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Distinct URLs downloaded during the run.
    pub downloaded: usize,
    /// Per-source counts, in run order.
    pub per_source: Vec<SourceTally>,
    pub cancelled: bool,
    pub records: Vec<DownloadRecord>,
}

/// Owns one run's downloader and source list.
pub struct Harvester {
    downloader: Downloader,
    sources: Vec<Box<dyn Source>>,
    throttle: Throttle,
    cancel: CancellationToken,
    events: Option<UnboundedSender<RunEvent>>,
}

impl Harvester {
    /// Build a harvester with every built-in source and an HTTP client
    /// configured from `config`.
    pub fn new(
        config: &HarvestConfig,
        cancel: CancellationToken,
        events: Option<UnboundedSender<RunEvent>>,
    ) -> reqwest::Result<Self> {
        let client = build_client(config.request_timeout(), &config.user_agent)?;
        Ok(Self::with_client(client, config, cancel, events))
    }

    pub fn with_client(
        client: Client,
        config: &HarvestConfig,
        cancel: CancellationToken,
        events: Option<UnboundedSender<RunEvent>>,
    ) -> Self {
        let mut downloader = Downloader::new(client, config.download_dir.clone(), cancel.clone())
            .with_page_timeout(config.request_timeout());
        if let Some(tx) = events.clone() {
            let progress: ProgressFn = Arc::new(move |filename: &str, percent: f64| {
                let _ = tx.send(RunEvent::Progress {
                    filename: filename.to_string(),
                    percent,
                });
            });
            downloader = downloader.with_progress(progress);
        }

        Self {
            downloader,
            sources: registry(),
            throttle: config.throttle(),
            cancel,
            events,
        }
    }

    /// Replace the source list.
    #[cfg(test)]
    pub fn with_sources(mut self, sources: Vec<Box<dyn Source>>) -> Self {
        self.sources = sources;
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Resolve the user's selection against the registered sources.
    ///
    /// `None` selects everything. Tokens are matched case-insensitively,
    /// duplicates collapse, and unknown tokens are warned about and dropped.
    fn select(&self, selected: Option<&[String]>) -> Vec<&dyn Source> {
        let Some(tokens) = selected else {
            return self.sources.iter().map(|s| s.as_ref()).collect();
        };

        let tokens: Vec<String> = tokens
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unique()
            .collect();

        for token in &tokens {
            if !self.sources.iter().any(|s| s.name() == token.as_str()) {
                warn!(
                    %token,
                    available = %self.sources.iter().map(|s| s.name()).join(","),
                    "Unknown source; ignoring"
                );
            }
        }

        tokens
            .iter()
            .filter_map(|t| self.sources.iter().find(|s| s.name() == t.as_str()))
            .map(|s| s.as_ref())
            .collect()
    }

    /// Run the selected sources one after another.
    ///
    /// A scraper that returns `Err` or panics is logged and the run moves on
    /// to the next source. Cancellation stops the run between sources.
    #[instrument(level = "info", skip_all, fields(root = %self.downloader.root().display()))]
    pub async fn run(&self, selected: Option<&[String]>) -> RunSummary {
        let sources = self.select(selected);
        info!(
            sources = %sources.iter().map(|s| s.name()).join(","),
            "Starting harvest"
        );

        let mut per_source = Vec::with_capacity(sources.len());
        for source in sources {
            if self.cancel.is_cancelled() {
                break;
            }
            let name = source.name();
            self.emit(RunEvent::SourceStarted {
                source: name.to_string(),
            });

            let ctx = ScrapeContext::new(
                name,
                &self.downloader,
                self.throttle,
                &self.cancel,
                self.events.as_ref(),
            );
            match AssertUnwindSafe(source.scrape(&ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(source = name, error = %e, "Source failed"),
                Err(panic) => error!(source = name, panic = %panic_message(panic.as_ref()), "Source panicked"),
            }

            let downloaded = ctx.downloaded();
            info!(source = name, downloaded, "Source finished");
            self.emit(RunEvent::SourceFinished {
                source: name.to_string(),
                downloaded,
            });
            per_source.push(SourceTally {
                source: name.to_string(),
                downloaded,
            });
        }

        let downloaded = self.downloader.downloaded_count();
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!(downloaded, "Harvest cancelled");
        }
        if downloaded == 0 {
            warn!("No PDFs were downloaded. Possible causes:");
            warn!("  - network issues or blocked requests");
            warn!("  - no matching documents at the sources");
            warn!("  - rate limiting by the source sites");
        } else {
            info!(downloaded, root = %self.downloader.root().display(), "Harvest complete");
        }
        self.emit(RunEvent::Finished { downloaded, cancelled });

        RunSummary {
            downloaded,
            per_source,
            cancelled,
            records: self.downloader.records(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
