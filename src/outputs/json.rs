//! JSON export of a whole run.
//!
//! The file carries everything [`RunOutput`] holds: the records in list
//! order, the aggregate report and the skip ledger, so a run can be inspected
//! or post-processed without the CSV.
//!
//! # Output Structure
//!
//! ```text
//! output/
//! └── note_data_20250506_203000.json
//! ```

use crate::models::RunOutput;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`RunOutput`] as pretty-printed JSON.
///
/// # Output Path
///
/// The file is written to: `{dir}/note_data_{stamp}.json`
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_run(
    output: &RunOutput,
    dir: &Path,
    stamp: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(output)?;

    if let Err(e) = fs::create_dir_all(dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let path = dir.join(format!("note_data_{stamp}.json"));
    info!(path = %path.display(), "Writing JSON");
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::summarize;
    use crate::errors::ParseError;
    use crate::models::{ArticleRecord, SkipLedger, SkippedItem};

    #[tokio::test]
    async fn test_write_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = ArticleRecord::new("https://note.com/w/n/n1", "One").unwrap();
        record.views = 5;
        record.set_published_at("2025/05/06");
        let records = vec![record];
        let mut skipped = SkipLedger::default();
        skipped.push(SkippedItem::row(1, 2, &ParseError::MissingUrl.into()));
        let output = RunOutput {
            report: summarize(&records, 5),
            records,
            skipped,
            pages_loaded: 1,
            cancelled: false,
        };

        let path = write_run(&output, dir.path(), "20250506_203000").await.unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["records"][0]["id"], "n1");
        assert_eq!(json["report"]["total_views"], 5);
        assert_eq!(json["skipped"]["items"][0]["kind"], "parse");
        assert_eq!(json["skipped"]["items"][0]["stage"], "list");
        assert_eq!(json["records"][0]["published_date"], "2025-05-06");
        assert!(json["records"][0]["body"].is_null());
    }
}
