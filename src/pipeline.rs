//! The extraction pipeline.
//!
//! [`Pipeline::run`] takes ownership of a browser for the length of one run
//! and sequences the stages:
//!
//! ```text
//! login ──▶ list pages ──▶ detail enrichment ──▶ summarize
//! ```
//!
//! Only two failures end a run: authentication, and a list whose first page
//! cannot be loaded at all. Everything after that degrades: bad rows, a page
//! that fails mid-walk, articles that cannot be read are recorded in the
//! skip ledger and the run completes with what it has.
//!
//! The browser is closed when `run` returns, whatever the outcome.

use crate::aggregator::summarize;
use crate::auth::Authenticator;
use crate::browser::{Browser, BrowserSlot};
use crate::config::{Credentials, PipelineConfig, SiteProfile};
use crate::diagnostics::DiagnosticsSink;
use crate::enricher::DetailEnricher;
use crate::errors::PipelineError;
use crate::gate::{FetchGate, RetryPolicy};
use crate::models::{RecordSet, RunOutput, SkipLedger, SkippedItem};
use crate::paginator::ListPaginator;
use futures::StreamExt;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

/// Cooperative stop request, checked between pages and between articles.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    site: SiteProfile,
    diagnostics: Arc<dyn DiagnosticsSink>,
    stop: StopSignal,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        site: SiteProfile,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            config,
            site,
            diagnostics,
            stop: StopSignal::default(),
        }
    }

    /// A handle that stops the current run at the next page or article.
    ///
    /// A stop requested between runs applies to the next run. The request
    /// is cleared when that run returns.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    #[instrument(level = "info", skip_all, fields(username = %credentials.username))]
    pub async fn run<B: Browser>(
        &self,
        browser: B,
        credentials: &Credentials,
    ) -> Result<RunOutput, PipelineError> {
        let slot = BrowserSlot::new(browser);
        let result = self.drive(&slot, credentials).await;
        if let Err(e) = slot.release().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        self.stop.clear();
        result
    }

    async fn drive<B: Browser>(
        &self,
        slot: &BrowserSlot<B>,
        credentials: &Credentials,
    ) -> Result<RunOutput, PipelineError> {
        let policy = RetryPolicy::from_config(&self.config);
        let diagnostics = self.diagnostics.as_ref();
        let mut records = RecordSet::default();
        let mut skipped = SkipLedger::default();
        let mut pages_loaded = 0u32;

        {
            let browser = slot.acquire().await;
            let gate = FetchGate::new(&*browser, &policy, diagnostics);

            Authenticator::new(&self.site, &self.config)
                .login(&gate, credentials)
                .await?;

            let paginator = ListPaginator::new(&gate, &self.site, &self.config, self.stop.clone())?;
            let mut pages = pin!(paginator.into_stream());
            while let Some(page) = pages.next().await {
                match page {
                    Ok(page) => {
                        pages_loaded = page.number;
                        skipped.extend(page.skipped);
                        for record in page.records {
                            let url = record.url.clone();
                            if records.upsert(record) {
                                debug!(%url, "Duplicate article; keeping the later values");
                            }
                        }
                    }
                    Err(e) if pages_loaded == 0 => {
                        error!(error = %e, "Could not load the article list");
                        gate.capture_failure("list_unavailable", &e).await;
                        return Err(PipelineError::ListUnavailable(e));
                    }
                    Err(e) => {
                        warn!(page = pages_loaded + 1, error = %e, "Pagination stopped early");
                        skipped.push(SkippedItem::page(pages_loaded + 1, &e));
                    }
                }
            }
        }
        info!(records = records.len(), pages = pages_loaded, "List extraction finished");

        let enricher =
            DetailEnricher::new(slot, &policy, diagnostics, &self.config, self.stop.clone());
        let failed = enricher.enrich(&mut records).await;
        skipped.extend(failed);

        let records = records.into_vec();
        let report = summarize(&records, self.config.top_n);
        let cancelled = self.stop.is_stopped();
        info!(
            records = records.len(),
            skipped = skipped.len(),
            cancelled,
            "Run finished"
        );
        for (kind, count) in skipped.by_kind() {
            warn!(%kind, count, "Skipped items");
        }

        Ok(RunOutput {
            records,
            report,
            skipped,
            pages_loaded,
            cancelled,
        })
    }
}
