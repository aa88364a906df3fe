//! Data models shared by every pipeline stage.
//!
//! - [`ArticleRecord`]: one article, created from a list row and filled in by
//!   detail enrichment
//! - [`RecordSet`]: the ordered, URL-deduplicated collection owned by a run
//! - [`SkippedItem`] / [`SkipLedger`]: everything that was dropped and why
//! - [`AggregateReport`]: the summary computed once at the end of a run
//! - [`RunOutput`]: what a run hands to the output writers

use crate::errors::{FetchError, FetchErrorKind, ItemError, ParseError};
use crate::utils::parse_date;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use url::Url;

/// One article's metrics plus optional enrichment fields.
///
/// `body` and `char_count` stay `None` until the detail page has been read;
/// `error` is set only when enrichment of this record failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    /// Publish date as displayed.
    pub published_at: Option<String>,
    /// `published_at` as a calendar date, when it is an absolute date.
    pub published_date: Option<NaiveDate>,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub body: Option<String>,
    pub char_count: Option<u64>,
    pub error: Option<String>,
}

impl ArticleRecord {
    /// Start a record from its (absolute) URL and title; counters start at zero.
    pub fn new(url: &str, title: impl Into<String>) -> Result<Self, ParseError> {
        let id = article_id(url)?;
        Ok(Self {
            id,
            url: url.to_string(),
            title: title.into(),
            published_at: None,
            published_date: None,
            views: 0,
            likes: 0,
            comments: 0,
            body: None,
            char_count: None,
            error: None,
        })
    }

    /// Record the displayed publish date and its parsed form.
    pub fn set_published_at(&mut self, raw: impl Into<String>) {
        let raw = raw.into();
        self.published_date = parse_date(&raw);
        self.published_at = Some(raw);
    }

    pub fn is_enriched(&self) -> bool {
        self.body.is_some()
    }
}

/// Stable identifier for an article URL.
///
/// note article URLs end in their key (`https://note.com/<user>/n/<key>`), so
/// the last non-empty path segment is used; URLs without a path fall back to
/// `host/path`.
pub fn article_id(url: &str) -> Result<String, ParseError> {
    let parsed = Url::parse(url).map_err(|e| ParseError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let last_segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string);

    match last_segment {
        Some(segment) => Ok(segment),
        None => {
            let host = parsed.host_str().ok_or_else(|| ParseError::InvalidUrl {
                url: url.to_string(),
                reason: "no host".to_string(),
            })?;
            Ok(format!("{}{}", host, parsed.path().trim_end_matches('/')))
        }
    }
}

/// Ordered record collection, unique by URL.
///
/// A record keeps the position where its URL was first seen; a later record
/// with the same URL replaces its values (last write wins).
#[derive(Debug, Default)]
pub struct RecordSet {
    records: Vec<ArticleRecord>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    /// Insert or replace; returns `true` when an existing record was replaced.
    pub fn upsert(&mut self, record: ArticleRecord) -> bool {
        match self.index.get(&record.url) {
            Some(&position) => {
                self.records[position] = record;
                true
            }
            None => {
                self.index.insert(record.url.clone(), self.records.len());
                self.records.push(record);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArticleRecord> {
        self.records.iter()
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut ArticleRecord> {
        let position = *self.index.get(url)?;
        self.records.get_mut(position)
    }

    pub fn into_vec(self) -> Vec<ArticleRecord> {
        self.records
    }
}

impl FromIterator<ArticleRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = ArticleRecord>>(iter: I) -> Self {
        let mut set = RecordSet::default();
        for record in iter {
            set.upsert(record);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    List,
    Detail,
}

/// Reporting category of a skipped item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    Parse,
    Timeout,
    ElementNotFound,
    NavigationFailed,
}

impl SkipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipKind::Parse => "parse",
            SkipKind::Timeout => "timeout",
            SkipKind::ElementNotFound => "element_not_found",
            SkipKind::NavigationFailed => "navigation_failed",
        }
    }
}

impl fmt::Display for SkipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FetchErrorKind> for SkipKind {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::Timeout => SkipKind::Timeout,
            FetchErrorKind::ElementNotFound => SkipKind::ElementNotFound,
            FetchErrorKind::NavigationFailed => SkipKind::NavigationFailed,
        }
    }
}

impl From<&ItemError> for SkipKind {
    fn from(error: &ItemError) -> Self {
        match error {
            ItemError::Parse(_) => SkipKind::Parse,
            ItemError::Fetch(e) => e.kind.into(),
        }
    }
}

/// A row, page or article that did not make it into the dataset intact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedItem {
    pub stage: Stage,
    pub kind: SkipKind,
    pub reason: String,
    pub url: Option<String>,
    pub page: Option<u32>,
}

impl SkippedItem {
    pub fn row(page: u32, row: usize, error: &ItemError) -> Self {
        Self {
            stage: Stage::List,
            kind: error.into(),
            reason: format!("row {}: {}", row + 1, error),
            url: None,
            page: Some(page),
        }
    }

    pub fn page(page: u32, error: &FetchError) -> Self {
        Self {
            stage: Stage::List,
            kind: error.kind.into(),
            reason: error.to_string(),
            url: None,
            page: Some(page),
        }
    }

    pub fn article(url: &str, error: &ItemError) -> Self {
        Self {
            stage: Stage::Detail,
            kind: error.into(),
            reason: error.to_string(),
            url: Some(url.to_string()),
            page: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkipLedger {
    items: Vec<SkippedItem>,
}

impl SkipLedger {
    pub fn push(&mut self, item: SkippedItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[SkippedItem] {
        &self.items
    }

    /// Skipped-item counts grouped by kind, in a stable order.
    pub fn by_kind(&self) -> BTreeMap<SkipKind, usize> {
        self.items.iter().map(|item| item.kind).counts().into_iter().collect()
    }
}

impl Extend<SkippedItem> for SkipLedger {
    fn extend<I: IntoIterator<Item = SkippedItem>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

/// One entry of a top-N ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedArticle {
    pub rank: usize,
    pub id: String,
    pub title: String,
    pub url: String,
    pub value: u64,
}

/// Summary statistics over a completed record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    /// No records: every total and average is zero.
    pub empty: bool,
    pub total_articles: usize,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_comments: u64,
    pub total_chars: u64,
    pub average_views: f64,
    pub average_likes: f64,
    pub average_comments: f64,
    /// Mean over enriched records only.
    pub average_chars: f64,
    /// Likes per view, in percent, over records that have views.
    pub like_ratio: f64,
    pub enriched_count: usize,
    pub error_count: usize,
    pub top_by_views: Vec<RankedArticle>,
    pub top_by_likes: Vec<RankedArticle>,
    pub top_by_comments: Vec<RankedArticle>,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub records: Vec<ArticleRecord>,
    pub report: AggregateReport,
    pub skipped: SkipLedger,
    pub pages_loaded: u32,
    pub cancelled: bool,
}

impl RunOutput {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}
