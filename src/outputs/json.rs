//! JSON digest files.
//!
//! Files are grouped by date with one file per edition:
//! ```text
//! json_output_dir/
//! └── 2026-05-06/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//! A second run in the same edition replaces the earlier file.

use crate::error::Result;
use crate::models::DigestReport;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the JSON file for `report` under `json_output_dir`.
pub fn report_path(report: &DigestReport, json_output_dir: impl AsRef<Path>) -> PathBuf {
    json_output_dir
        .as_ref()
        .join(&report.local_date)
        .join(format!("{}.json", report.time_of_day))
}

/// Write a [`DigestReport`] as pretty JSON to
/// `{json_output_dir}/{date}/{time_of_day}.json`.
///
/// The date directory is created if needed and an existing file for the
/// same edition is replaced.
///
/// # Arguments
///
/// * `report` - The digest to serialize
/// * `json_output_dir` - Base directory for JSON output
///
/// # Returns
///
/// The path of the written file.
///
/// # Errors
///
/// Returns an error if serialization, directory creation or the write fails.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.as_ref().display()))]
pub async fn write_report(report: &DigestReport, json_output_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(report, &json_output_dir);

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), entries = report.entries.len(), "Wrote JSON digest");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryOutcome;

    fn report() -> DigestReport {
        DigestReport {
            local_date: "2026-05-06".to_string(),
            time_of_day: "morning".to_string(),
            local_time: "07:30:00".to_string(),
            query: Some("AI".to_string()),
            searched: 2,
            kept_after_filter: 1,
            entries: vec![EntryOutcome::Failed {
                url: "https://news.example/1".to_string(),
                title: None,
                error: "llm error: timeout".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_writes_dated_edition_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&report(), dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("2026-05-06").join("morning.json"));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["kept_after_filter"], 1);
        assert_eq!(written["entries"][0]["status"], "failed");
        assert_eq!(written["entries"][0]["error"], "llm error: timeout");
    }
}
