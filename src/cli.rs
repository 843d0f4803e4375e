//! Command-line interface definitions for the harvester.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option is optional; unset values fall back to the YAML config file
//! (if any) and then to [`HarvestConfig::default`](crate::config::HarvestConfig).

use clap::Parser;

/// Command-line arguments for the mathematics PDF harvester.
///
/// # Examples
///
/// ```sh
/// # Every source, into ./math_books
/// math_pdf_harvester
///
/// # Only arXiv and Project Gutenberg, into a custom directory
/// math_pdf_harvester -d ~/papers -s arxiv,gutenberg
///
/// # Settings from a file, with a log file next to the console output
/// math_pdf_harvester -c harvest.yaml --log-file harvest.log
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Root directory for downloaded documents
    #[arg(short, long, env = "MATH_HARVEST_DIR")]
    pub download_dir: Option<String>,

    /// Comma-separated source tokens: arxiv, mit_ocw, gutenberg, open_textbook, oer_commons, merlot
    #[arg(short, long, env = "MATH_HARVEST_SOURCES", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Pause after each item, in seconds
    #[arg(long)]
    pub item_delay_secs: Option<f64>,

    /// Pause after each search term or category, in seconds
    #[arg(long)]
    pub term_delay_secs: Option<f64>,

    /// Also write log lines to this file
    #[arg(long)]
    pub log_file: Option<String>,

    /// Skip writing download_report.json
    #[arg(long)]
    pub no_report: bool,
}
