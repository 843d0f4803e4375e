//! Data models shared by the scrapers, the classifier and the download manager.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Field`]: Subject bucket a document is filed under
//! - [`Candidate`]: A discovered document proposed for download
//! - [`DownloadRecord`]: A document that was actually written to disk
//! - [`RunEvent`]: Messages streamed from the harvesting task to its consumer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mathematical subject a downloaded document is filed under.
///
/// The declaration order is the classifier's priority order: when a title
/// matches keywords of several fields, the earliest one wins. [`Field::Other`]
/// has no keywords and is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Calculus,
    Algebra,
    Geometry,
    Analysis,
    Probability,
    NumberTheory,
    DiscreteMath,
    AppliedMath,
    Other,
}

impl Field {
    /// Every field, in classifier priority order.
    #[cfg(test)]
    pub const ALL: [Field; 9] = [
        Field::Calculus,
        Field::Algebra,
        Field::Geometry,
        Field::Analysis,
        Field::Probability,
        Field::NumberTheory,
        Field::DiscreteMath,
        Field::AppliedMath,
        Field::Other,
    ];

    /// Directory name used under the download root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Calculus => "calculus",
            Field::Algebra => "algebra",
            Field::Geometry => "geometry",
            Field::Analysis => "analysis",
            Field::Probability => "probability",
            Field::NumberTheory => "number_theory",
            Field::DiscreteMath => "discrete_math",
            Field::AppliedMath => "applied_math",
            Field::Other => "other",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document discovered by a scraper and proposed for download.
///
/// Candidates live only for the duration of one scraping pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Human-readable title as published by the source.
    pub title: String,
    /// Abstract or description text; empty when the source has none.
    pub abstract_text: String,
    /// Absolute URL of the PDF.
    pub source_url: String,
    /// Token of the scraper that produced the candidate (e.g. `arxiv`).
    pub source_name: String,
    /// Optional file stem to use instead of the title.
    pub file_stem: Option<String>,
}

impl Candidate {
    pub fn new(
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        source_url: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
            source_url: source_url.into(),
            source_name: source_name.into(),
            file_stem: None,
        }
    }

    /// Name the downloaded file after `stem` rather than the title.
    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = Some(stem.into());
        self
    }

    /// The unsanitized name the file should be saved under.
    pub fn raw_filename(&self) -> &str {
        self.file_stem.as_deref().unwrap_or(&self.title)
    }
}

/// A successful download. Only created when at least one byte was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// The URL that was fetched; also the deduplication key.
    pub url: String,
    /// Subject folder the file was placed in.
    pub field: Field,
    /// Scraper token, also the second directory level.
    pub source_name: String,
    /// Sanitized file name on disk.
    pub filename: String,
    /// Size of the written file.
    pub bytes_written: u64,
}

/// Messages sent from the harvesting task to whoever drives it (the CLI, or a GUI).
///
/// The channel is one-way: the worker never waits on the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A source scraper is about to run.
    SourceStarted { source: String },
    /// Progress of the file currently being written, in percent.
    Progress { filename: String, percent: f64 },
    /// A file was written and recorded.
    Downloaded(DownloadRecord),
    /// A source finished with `downloaded` new files.
    SourceFinished { source: String, downloaded: usize },
    /// The run is over; `downloaded` is the number of distinct URLs fetched.
    Finished { downloaded: usize, cancelled: bool },
}
