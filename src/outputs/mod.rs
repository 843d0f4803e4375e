//! Output generation for finished runs.
//!
//! # Submodules
//!
//! - [`json`]: Writes the run summary to `download_report.json` in the download root

pub mod json;
