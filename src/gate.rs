//! The fetch gate: pacing, timeouts and retries for every browser call.
//!
//! No stage talks to the [`Browser`] directly. Page readers go through a
//! [`FetchGate`], which applies the [`RetryPolicy`] uniformly:
//!
//! 1. **Pacing**: requests that hit the site (navigations, clicks, form
//!    input) wait `request_delay` before every attempt. Reads of the already
//!    loaded DOM are not paced.
//! 2. **Timeout**: each attempt gets at most `timeout`; an attempt that runs
//!    over is dropped and counted as a [`BrowserError::Timeout`].
//! 3. **Retry**: transient failures are retried with linear back-off until
//!    `max_attempts` calls have been made. Permanent failures (element
//!    absent, request rejected) are returned after the first attempt.
//!
//! # Retry Strategy
//!
//! ```text
//! delay(attempt) = backoff * attempt + random_jitter(0..250ms)
//! ```
//!
//! `max_attempts` counts every call, the first one included: with
//! `max_attempts = 3` a failing action runs exactly three times.
//!
//! When retries are exhausted the gate asks the diagnostics sink for a
//! capture before returning the [`FetchError`].

use crate::browser::Browser;
use crate::config::PipelineConfig;
use crate::diagnostics::{DiagnosticCapture, DiagnosticsSink};
use crate::errors::{BrowserError, FetchError, FetchErrorKind};
use crate::utils::slugify;
use chrono::Utc;
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total calls per operation, first call included.
    pub max_attempts: u32,
    pub request_delay: Duration,
    pub timeout: Duration,
    pub backoff: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            request_delay: config.request_delay,
            timeout: config.timeout,
            backoff: config.retry_backoff,
            jitter: config.retry_jitter,
        }
    }

    /// Pause after the `attempt`-th failed call.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = self.backoff.saturating_mul(attempt);
        if self.jitter {
            let jitter_ms: u64 = rng().random_range(0..=250);
            delay + Duration::from_millis(jitter_ms)
        } else {
            delay
        }
    }
}

/// Book-keeping for one operation while the gate retries it.
#[derive(Debug)]
struct FetchAttempt<'d> {
    description: &'d str,
    attempts: u32,
    last_error: Option<BrowserError>,
    started: Instant,
}

impl<'d> FetchAttempt<'d> {
    fn new(description: &'d str) -> Self {
        Self {
            description,
            attempts: 0,
            last_error: None,
            started: Instant::now(),
        }
    }

    fn into_error(self) -> FetchError {
        let cause = self
            .last_error
            .unwrap_or_else(|| BrowserError::Protocol("no attempt was made".to_string()));
        FetchError {
            kind: FetchErrorKind::from_cause(&cause),
            description: self.description.to_string(),
            attempts: self.attempts,
            last_cause: cause,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Routes browser calls through the retry policy.
///
/// A gate borrows the browser for as long as the caller holds the browser
/// slot; it is cheap to build one per slot acquisition.
pub struct FetchGate<'a, B> {
    browser: &'a B,
    policy: &'a RetryPolicy,
    diagnostics: &'a dyn DiagnosticsSink,
}

impl<'a, B: Browser> FetchGate<'a, B> {
    pub fn new(
        browser: &'a B,
        policy: &'a RetryPolicy,
        diagnostics: &'a dyn DiagnosticsSink,
    ) -> Self {
        Self {
            browser,
            policy,
            diagnostics,
        }
    }

    /// Run a paced browser request under the retry policy.
    pub async fn execute<T, F, Fut>(&self, description: &str, action: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        self.run(description, true, action).await
    }

    /// Like [`execute`](Self::execute) without the request delay, for reads
    /// of the current page.
    pub async fn read<T, F, Fut>(&self, description: &str, action: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        self.run(description, false, action).await
    }

    async fn run<T, F, Fut>(
        &self,
        description: &str,
        paced: bool,
        mut action: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        let mut attempt = FetchAttempt::new(description);

        loop {
            if paced && !self.policy.request_delay.is_zero() {
                sleep(self.policy.request_delay).await;
            }
            attempt.attempts += 1;
            let attempt_t0 = Instant::now();

            let outcome = match timeout(self.policy.timeout, action()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BrowserError::Timeout(format!(
                    "no response within {:?}",
                    self.policy.timeout
                ))),
            };

            let e = match outcome {
                Ok(value) => {
                    if attempt.attempts > 1 {
                        info!(
                            operation = description,
                            attempt = attempt.attempts,
                            "Recovered after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let transient = e.is_transient();
            let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
            let elapsed_ms_total = attempt.started.elapsed().as_millis();

            if !transient {
                debug!(operation = description, error = %e, "Permanent failure; not retrying");
                attempt.last_error = Some(e);
                return Err(attempt.into_error());
            }

            if attempt.attempts >= self.policy.max_attempts {
                error!(
                    operation = description,
                    attempt = attempt.attempts,
                    max = self.policy.max_attempts,
                    elapsed_ms_attempt,
                    elapsed_ms_total,
                    error = %e,
                    "Exhausted retries"
                );
                attempt.last_error = Some(e);
                let err = attempt.into_error();
                self.capture_failure(description, &err).await;
                return Err(err);
            }

            let delay = self.policy.delay_after(attempt.attempts);
            warn!(
                operation = description,
                attempt = attempt.attempts,
                max = self.policy.max_attempts,
                elapsed_ms_attempt,
                elapsed_ms_total,
                ?delay,
                error = %e,
                "Attempt failed; backing off"
            );
            attempt.last_error = Some(e);
            sleep(delay).await;
        }
    }

    /// Request a diagnostic capture of the current page.
    ///
    /// Best effort: each browser read is bounded by the policy timeout and a
    /// failure only drops that part of the capture.
    pub async fn capture(
        &self,
        tag: &str,
        description: &str,
        attempts: u32,
        cause: &dyn fmt::Display,
    ) {
        let limit = self.policy.timeout;
        let screenshot = timeout(limit, self.browser.screenshot())
            .await
            .ok()
            .and_then(Result::ok);
        let url = timeout(limit, self.browser.current_url())
            .await
            .ok()
            .and_then(Result::ok);
        let page_source = timeout(limit, self.browser.page_source())
            .await
            .ok()
            .and_then(Result::ok);

        self.diagnostics.submit(DiagnosticCapture {
            tag: slugify(tag),
            description: description.to_string(),
            captured_at: Utc::now(),
            url,
            attempts,
            cause: cause.to_string(),
            screenshot,
            page_source,
        })
        .await;
    }

    pub async fn capture_failure(&self, tag: &str, error: &FetchError) {
        self.capture(tag, &error.description, error.attempts, error).await;
    }

    pub async fn navigate(&self, url: &str) -> Result<(), FetchError> {
        let browser = self.browser;
        self.execute(&format!("navigate {url}"), move || browser.navigate(url))
            .await
    }

    pub async fn find(&self, selector: &str) -> Result<B::Element, FetchError> {
        let browser = self.browser;
        self.read(&format!("find {selector}"), move || browser.find_element(selector))
            .await
    }

    /// `find`, with an absent element reported as `None`.
    pub async fn find_optional(&self, selector: &str) -> Result<Option<B::Element>, FetchError> {
        match self.find(selector).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// First element matched by any of `selectors`, tried in order.
    pub async fn find_first_of(
        &self,
        selectors: &[&str],
    ) -> Result<Option<B::Element>, FetchError> {
        for selector in selectors {
            if let Some(element) = self.find_optional(selector).await? {
                debug!(selector, "Selector matched");
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    pub async fn find_all(&self, selector: &str) -> Result<Vec<B::Element>, FetchError> {
        let browser = self.browser;
        self.read(&format!("find all {selector}"), move || browser.find_elements(selector))
            .await
    }

    /// Descendant of `parent` matching `selector`, if any.
    pub async fn find_within(
        &self,
        parent: &B::Element,
        selector: &str,
    ) -> Result<Option<B::Element>, FetchError> {
        let browser = self.browser;
        let found = self
            .read(&format!("find {selector} in element"), move || {
                browser.find_within(parent, selector)
            })
            .await;
        match found {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn find_within_first_of(
        &self,
        parent: &B::Element,
        selectors: &[&str],
    ) -> Result<Option<B::Element>, FetchError> {
        for selector in selectors {
            if let Some(element) = self.find_within(parent, selector).await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    pub async fn text(&self, element: &B::Element) -> Result<String, FetchError> {
        let browser = self.browser;
        self.read("read text", move || browser.read_text(element)).await
    }

    pub async fn attribute(
        &self,
        element: &B::Element,
        name: &str,
    ) -> Result<Option<String>, FetchError> {
        let browser = self.browser;
        self.read(&format!("read attribute {name}"), move || {
            browser.read_attribute(element, name)
        })
        .await
    }

    pub async fn click(&self, element: &B::Element, what: &str) -> Result<(), FetchError> {
        let browser = self.browser;
        self.execute(&format!("click {what}"), move || browser.click(element))
            .await
    }

    /// Type into a form field. `field` names the field in logs; the value
    /// never appears in them.
    pub async fn fill(
        &self,
        element: &B::Element,
        field: &str,
        value: &str,
    ) -> Result<(), FetchError> {
        let browser = self.browser;
        self.execute(&format!("fill {field}"), move || browser.fill_field(element, value))
            .await
    }

    pub async fn page_source(&self) -> Result<String, FetchError> {
        let browser = self.browser;
        self.read("read page source", move || browser.page_source()).await
    }

    pub async fn current_url(&self) -> Result<String, FetchError> {
        let browser = self.browser;
        self.read("read current url", move || browser.current_url()).await
    }
}
