//! Run configuration: defaults, optional YAML file, and CLI overrides.
//!
//! Precedence is CLI flag > YAML file > built-in default.
//!
//! ```yaml
//! download_dir: ./math_books
//! sources: [arxiv, gutenberg]
//! request_timeout_secs: 30
//! item_delay_secs: 3
//! term_delay_secs: 5
//! ```

use crate::cli::Cli;
use crate::download::BROWSER_USER_AGENT;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Fixed-rate pacing between requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throttle {
    /// Pause after each item (a downloaded document or a visited detail page).
    pub item_delay: Duration,
    /// Pause after each search term, category or listing page.
    pub term_delay: Duration,
}

impl Throttle {
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            item_delay: Duration::ZERO,
            term_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Root of the `<field>/<source>/` tree.
    pub download_dir: PathBuf,
    /// Source tokens to run; `None` runs every known source.
    pub sources: Option<Vec<String>>,
    pub request_timeout_secs: u64,
    pub item_delay_secs: f64,
    pub term_delay_secs: f64,
    pub user_agent: String,
    /// Write `download_report.json` into the download root after the run.
    pub write_report: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("math_books"),
            sources: None,
            request_timeout_secs: 30,
            item_delay_secs: 3.0,
            term_delay_secs: 5.0,
            user_agent: BROWSER_USER_AGENT.to_string(),
            write_report: true,
        }
    }
}

impl HarvestConfig {
    /// Parse a YAML config file. Missing keys keep their defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        info!("Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Resolve the effective configuration for a CLI invocation.
    pub fn from_cli(cli: &Cli) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut config = match &cli.config {
            Some(path) => Self::load(Path::new(path))?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        Ok(config)
    }

    /// Overlay values the user passed on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.download_dir {
            self.download_dir = PathBuf::from(dir);
        }
        if !cli.sources.is_empty() {
            self.sources = Some(cli.sources.clone());
        }
        if let Some(secs) = cli.timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = cli.item_delay_secs {
            self.item_delay_secs = secs;
        }
        if let Some(secs) = cli.term_delay_secs {
            self.term_delay_secs = secs;
        }
        if cli.no_report {
            self.write_report = false;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn throttle(&self) -> Throttle {
        Throttle {
            item_delay: secs(self.item_delay_secs),
            term_delay: secs(self.term_delay_secs),
        }
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
