//! Writers for the artifacts of a finished run.
//!
//! # Submodules
//!
//! - [`csv`]: one row per article, for spreadsheets
//! - [`json`]: the complete run output (records, report, skipped items)
//! - [`markdown`]: a human-readable summary report
//!
//! # Output Structure
//!
//! All three share the run's timestamp:
//! ```text
//! output/
//! ├── note_data_20250506_203000.csv
//! ├── note_data_20250506_203000.json
//! └── note_report_20250506_203000.md
//! ```

use crate::models::RunOutput;
use chrono::{DateTime, Local};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub mod csv;
pub mod json;
pub mod markdown;

/// Paths of the files written for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifacts {
    pub csv: PathBuf,
    pub json: PathBuf,
    pub report: PathBuf,
}

/// Write every artifact for `output` into `dir`.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_all(
    output: &RunOutput,
    dir: &Path,
    generated_at: DateTime<Local>,
) -> Result<Artifacts, Box<dyn Error>> {
    let stamp = crate::utils::file_stamp(generated_at);
    let artifacts = Artifacts {
        csv: csv::write_records(&output.records, dir, &stamp).await?,
        json: json::write_run(output, dir, &stamp).await?,
        report: markdown::write_report(output, dir, &stamp, generated_at).await?,
    };
    info!(
        csv = %artifacts.csv.display(),
        json = %artifacts.json.display(),
        report = %artifacts.report.display(),
        "Wrote outputs"
    );
    Ok(artifacts)
}
