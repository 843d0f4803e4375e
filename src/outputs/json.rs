//! JSON run report.
//!
//! After a run the harvester leaves a summary next to the files it wrote:
//! ```text
//! download_root/
//! ├── download_report.json
//! ├── calculus/
//! │   └── arxiv/
//! └── ...
//! ```

use crate::harvest::{RunSummary, SourceTally};
use crate::models::DownloadRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const REPORT_FILE_NAME: &str = "download_report.json";

#[derive(Debug, Serialize)]
struct Report<'a> {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    download_root: &'a Path,
    downloaded: usize,
    cancelled: bool,
    per_source: &'a [SourceTally],
    records: &'a [DownloadRecord],
}

/// Write `summary` to `<root>/download_report.json`.
///
/// # Returns
///
/// The path of the written report.
#[instrument(level = "info", skip_all, fields(root = %root.display()))]
pub async fn write_report(
    summary: &RunSummary,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    root: &Path,
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let report = Report {
        started_at,
        finished_at,
        download_root: root,
        downloaded: summary.downloaded,
        cancelled: summary.cancelled,
        per_source: &summary.per_source,
        records: &summary.records,
    };
    let json = serde_json::to_string_pretty(&report)?;

    if let Err(e) = fs::create_dir_all(root).await {
        error!(error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = root.join(REPORT_FILE_NAME);
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_write_report_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let summary = RunSummary {
            downloaded: 1,
            per_source: vec![SourceTally {
                source: "arxiv".to_string(),
                downloaded: 1,
            }],
            cancelled: false,
            records: vec![DownloadRecord {
                url: "https://arxiv.org/pdf/1234.5678.pdf".to_string(),
                field: Field::NumberTheory,
                source_name: "arxiv".to_string(),
                filename: "math.NT_Primes.pdf".to_string(),
                bytes_written: 42,
            }],
        };
        let started = Utc.with_ymd_and_hms(2025, 5, 6, 8, 0, 0).unwrap();
        let finished = Utc.with_ymd_and_hms(2025, 5, 6, 8, 5, 0).unwrap();

        let path = write_report(&summary, started, finished, tmp.path()).await.unwrap();
        assert_eq!(path, tmp.path().join(REPORT_FILE_NAME));

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["started_at"], "2025-05-06T08:00:00Z");
        assert_eq!(value["downloaded"], 1);
        assert_eq!(value["cancelled"], false);
        assert_eq!(value["per_source"][0]["source"], "arxiv");
        assert_eq!(value["records"][0]["field"], "number_theory");
        assert_eq!(value["records"][0]["bytes_written"], 42);
    }

    #[tokio::test]
    async fn test_write_report_creates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("not/yet/there");
        let summary = RunSummary {
            downloaded: 0,
            per_source: vec![],
            cancelled: true,
            records: vec![],
        };
        let now = Utc::now();
        write_report(&summary, now, now, &root).await.unwrap();
        assert!(root.join(REPORT_FILE_NAME).exists());
    }
}
