//! Detail enrichment: open each article and fill in its body.
//!
//! The first `max_articles` records (in list order) are visited. Up to
//! `max_workers` visits are queued at once, but each one holds the browser
//! slot for its whole navigate-and-read sequence, so the tab only ever shows
//! one article at a time. Results are put back into list order before they
//! are merged.
//!
//! A failed article keeps its list metrics, gets its `error` field set and
//! is reported as a skip. Articles not visited because a stop was requested
//! are left untouched and are not reported.

use crate::browser::{Browser, BrowserSlot};
use crate::config::PipelineConfig;
use crate::diagnostics::DiagnosticsSink;
use crate::errors::ItemError;
use crate::gate::{FetchGate, RetryPolicy};
use crate::models::{ArticleRecord, RecordSet, SkippedItem};
use crate::pages::detail::{self, ArticleDetail};
use crate::pipeline::StopSignal;
use crate::utils::truncate_for_log;
use futures::{StreamExt, stream};
use tracing::{debug, info, instrument, warn};

type Outcome = Option<Result<ArticleDetail, ItemError>>;

pub struct DetailEnricher<'a, B> {
    slot: &'a BrowserSlot<B>,
    policy: &'a RetryPolicy,
    diagnostics: &'a dyn DiagnosticsSink,
    max_articles: Option<usize>,
    skip: bool,
    workers: usize,
    stop: StopSignal,
}

impl<'a, B: Browser> DetailEnricher<'a, B> {
    pub fn new(
        slot: &'a BrowserSlot<B>,
        policy: &'a RetryPolicy,
        diagnostics: &'a dyn DiagnosticsSink,
        config: &PipelineConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            slot,
            policy,
            diagnostics,
            max_articles: config.max_articles,
            skip: config.skip_details,
            workers: config.max_workers.max(1),
            stop,
        }
    }

    /// Enrich `records` in place and return the articles that failed.
    #[instrument(level = "info", skip_all, fields(records = records.len()))]
    pub async fn enrich(&self, records: &mut RecordSet) -> Vec<SkippedItem> {
        if self.skip {
            info!("Detail enrichment disabled");
            return Vec::new();
        }

        let targets: Vec<(usize, String)> = records
            .iter()
            .take(self.max_articles.unwrap_or(usize::MAX))
            .map(|record| record.url.clone())
            .enumerate()
            .collect();
        let total = targets.len();
        info!(articles = total, workers = self.workers, "Enriching articles");

        let outcomes: Vec<(usize, (String, Outcome))> = stream::iter(targets)
            .map(|(index, url)| async move {
                let outcome = self.visit(index, total, &url).await;
                (index, (url, outcome))
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut skipped = Vec::new();
        let mut enriched = 0usize;
        for (url, outcome) in restore_order(outcomes) {
            let Some(record) = records.get_mut(&url) else {
                continue;
            };
            match outcome {
                None => {}
                Some(Ok(detail)) => {
                    merge(record, detail);
                    enriched += 1;
                }
                Some(Err(e)) => {
                    record.error = Some(e.to_string());
                    skipped.push(SkippedItem::article(&url, &e));
                }
            }
        }

        info!(enriched, failed = skipped.len(), "Enrichment finished");
        skipped
    }

    async fn visit(&self, index: usize, total: usize, url: &str) -> Outcome {
        if self.stop.is_stopped() {
            debug!(%url, "Stop requested; not opening article");
            return None;
        }
        let browser = self.slot.acquire().await;
        if self.stop.is_stopped() {
            return None;
        }

        let gate = FetchGate::new(&*browser, self.policy, self.diagnostics);
        info!(article = index + 1, total, %url, "Reading article");
        let result = detail::read_detail(&gate, url).await;
        match &result {
            Ok(detail) => debug!(
                %url,
                chars = detail.body.chars().count(),
                preview = %truncate_for_log(&detail.body, 80),
                "Article read"
            ),
            Err(e) => warn!(%url, error = %e, "Could not enrich article"),
        }
        Some(result)
    }
}

/// Put `(index, value)` pairs back into index order.
pub fn restore_order<T>(mut indexed: Vec<(usize, T)>) -> Vec<T> {
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, value)| value).collect()
}

/// Fold an article page into its list record.
///
/// The body always wins. The list's publish date and a non-zero view count
/// are kept; the article page only fills them when the list had nothing.
pub fn merge(record: &mut ArticleRecord, detail: ArticleDetail) {
    record.char_count = Some(detail.body.chars().count() as u64);
    record.body = Some(detail.body);
    if record.published_at.is_none() {
        if let Some(date) = detail.published_at {
            record.set_published_at(date);
        }
    }
    if record.views == 0 {
        if let Some(views) = detail.views {
            record.views = views;
        }
    }
    record.error = None;
}
