//! CSV export, one row per article in list order.

use crate::models::ArticleRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Column layout of the export. The body itself is left out; its length is
/// in `char_count`.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    title: &'a str,
    url: &'a str,
    published_at: Option<&'a str>,
    published_date: Option<NaiveDate>,
    views: u64,
    likes: u64,
    comments: u64,
    char_count: Option<u64>,
    error: Option<&'a str>,
}

impl<'a> From<&'a ArticleRecord> for CsvRow<'a> {
    fn from(r: &'a ArticleRecord) -> Self {
        Self {
            id: &r.id,
            title: &r.title,
            url: &r.url,
            published_at: r.published_at.as_deref(),
            published_date: r.published_date,
            views: r.views,
            likes: r.likes,
            comments: r.comments,
            char_count: r.char_count,
            error: r.error.as_deref(),
        }
    }
}

pub fn render(records: &[ArticleRecord]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display(), records = records.len()))]
pub async fn write_records(
    records: &[ArticleRecord],
    dir: &Path,
    stamp: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(format!("note_data_{stamp}.csv"));
    fs::write(&path, render(records)?).await?;
    info!(path = %path.display(), "Wrote CSV");
    Ok(path)
}
