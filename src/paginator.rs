//! Walking the article stats list page by page.
//!
//! The first call opens the stats dashboard and switches it to the
//! configured period; every later call follows the "next page" control. The
//! walk ends when there is no next control, a page has no rows, the page cap
//! is reached, a stop is requested, or a page fails to load.
//!
//! The table is rendered by script, so after every navigation or click the
//! paginator polls the rows until the table has content that differs from
//! what was shown before, for at most `render_wait`. A "next" click that
//! leaves the table unchanged ends the walk.
//!
//! Rows that cannot be parsed are reported alongside the page's records and
//! never end the walk.

use crate::browser::Browser;
use crate::config::{Period, PipelineConfig, SiteProfile};
use crate::errors::FetchError;
use crate::gate::FetchGate;
use crate::models::{ArticleRecord, SkippedItem};
use crate::pages::list::{self, PeriodSelection};
use crate::pipeline::StopSignal;
use futures::Stream;
use futures::stream;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// One list page's worth of extraction.
#[derive(Debug)]
pub struct ListPage {
    /// 1-based.
    pub number: u32,
    pub records: Vec<ArticleRecord>,
    pub skipped: Vec<SkippedItem>,
}

/// What the table showed once it settled.
struct Settled<E> {
    rows: Vec<E>,
    hrefs: Vec<Option<String>>,
    /// Whether the rows differ from the ones shown before the action.
    changed: bool,
}

pub struct ListPaginator<'g, 'a, B> {
    gate: &'g FetchGate<'a, B>,
    stats_url: Url,
    base: Url,
    period: Period,
    max_pages: Option<u32>,
    render_wait: Duration,
    poll: Duration,
    stop: StopSignal,
    pages_loaded: u32,
    /// Row hrefs of the last page read.
    shown: Vec<Option<String>>,
    finished: bool,
}

impl<'g, 'a, B: Browser> ListPaginator<'g, 'a, B> {
    pub fn new(
        gate: &'g FetchGate<'a, B>,
        site: &SiteProfile,
        config: &PipelineConfig,
        stop: StopSignal,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            gate,
            stats_url: site.stats_url()?,
            base: site.base()?,
            period: config.period,
            max_pages: config.max_pages,
            render_wait: config.render_wait,
            poll: config.verify_poll,
            stop,
            pages_loaded: 0,
            shown: Vec::new(),
            finished: false,
        })
    }

    pub fn pages_loaded(&self) -> u32 {
        self.pages_loaded
    }

    /// The next page, or `None` once the list is exhausted.
    ///
    /// After an error the paginator is finished and keeps returning `None`.
    #[instrument(level = "info", skip_all, fields(page = self.pages_loaded + 1))]
    pub async fn next_page(&mut self) -> Result<Option<ListPage>, FetchError> {
        if self.finished {
            return Ok(None);
        }
        if self.stop.is_stopped() {
            info!(pages = self.pages_loaded, "Stop requested; ending pagination");
            self.finished = true;
            return Ok(None);
        }

        let page = self.advance().await;
        if !matches!(page, Ok(Some(_))) {
            self.finished = true;
        }
        page
    }

    async fn advance(&mut self) -> Result<Option<ListPage>, FetchError> {
        let settled = if self.pages_loaded == 0 {
            self.gate.navigate(self.stats_url.as_str()).await?;
            let loaded = self.settle(None).await?;
            match list::select_period(self.gate, self.period).await {
                Ok(PeriodSelection::Clicked) => {
                    debug!(period = self.period.label(), "Period selected");
                    // Unchanged rows are kept once `render_wait` runs out.
                    self.settle(Some(&loaded.hrefs)).await?
                }
                Ok(PeriodSelection::Unavailable) => {
                    warn!(
                        period = self.period.label(),
                        "Period tab not found; using the dashboard default"
                    );
                    loaded
                }
                Ok(PeriodSelection::AlreadyActive) => loaded,
                Err(e) => {
                    warn!(error = %e, "Could not select period");
                    loaded
                }
            }
        } else {
            if self.max_pages.is_some_and(|max| self.pages_loaded >= max) {
                info!(pages = self.pages_loaded, "Reached page limit");
                return Ok(None);
            }
            let Some(next) = list::next_page_control(self.gate).await? else {
                info!(pages = self.pages_loaded, "No further pages");
                return Ok(None);
            };
            self.gate.click(&next, "next page").await?;
            let previous = std::mem::take(&mut self.shown);
            let settled = self.settle(Some(&previous)).await?;
            if !settled.changed && !settled.rows.is_empty() {
                warn!(
                    pages = self.pages_loaded,
                    waited = ?self.render_wait,
                    "List did not change after clicking next; ending pagination"
                );
                return Ok(None);
            }
            settled
        };

        let number = self.pages_loaded + 1;
        let Settled { rows, hrefs, .. } = settled;
        if rows.is_empty() {
            info!(page = number, "Page has no rows; list ends");
            return Ok(None);
        }
        self.shown = hrefs;
        self.pages_loaded = number;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            match list::parse_row(self.gate, row, &self.base).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(page = number, row = i + 1, error = %e, "Skipping row");
                    skipped.push(SkippedItem::row(number, i, &e));
                }
            }
        }

        info!(
            page = number,
            records = records.len(),
            skipped = skipped.len(),
            "Read list page"
        );
        Ok(Some(ListPage {
            number,
            records,
            skipped,
        }))
    }

    /// Poll the table until it has rows that differ from `previous`, or
    /// `render_wait` has passed. Reads the table at least once.
    async fn settle(
        &self,
        previous: Option<&[Option<String>]>,
    ) -> Result<Settled<B::Element>, FetchError> {
        let deadline = Instant::now() + self.render_wait;
        loop {
            let rows = list::read_rows(self.gate).await?;
            let hrefs = match list::row_hrefs(self.gate, &rows).await {
                Ok(hrefs) => hrefs,
                Err(e) if Instant::now() < deadline => {
                    debug!(error = %e, "Rows changed while being read");
                    sleep(self.poll).await;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let changed = previous.is_none_or(|p| p != hrefs.as_slice());
            if (changed && !rows.is_empty()) || Instant::now() >= deadline {
                return Ok(Settled {
                    rows,
                    hrefs,
                    changed,
                });
            }
            debug!(rows = rows.len(), changed, "Waiting for the list to render");
            sleep(self.poll).await;
        }
    }

    /// Lazily yield pages; an error is yielded once and ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<ListPage, FetchError>> {
        stream::unfold(self, |mut paginator| async move {
            match paginator.next_page().await {
                Ok(Some(page)) => Some((Ok(page), paginator)),
                Ok(None) => None,
                Err(e) => Some((Err(e), paginator)),
            }
        })
    }
}
