//! Error taxonomy for the extraction pipeline.
//!
//! Errors are layered the same way the pipeline is:
//!
//! - [`BrowserError`]: a single failed call against the browser capability,
//!   classified as transient (worth retrying) or permanent.
//! - [`FetchError`]: what the fetch gate returns once it has given up on an
//!   operation, carrying the attempt count and the last cause.
//! - [`ParseError`] / [`ItemError`]: per-row and per-article failures. These are
//!   always absorbed into the skip ledger and never abort a run.
//! - [`AuthError`] and [`PipelineError`]: session-level failures that end a run.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A failed call against the browser capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrowserError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("stale element: {0}")]
    StaleElement(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser protocol error: {0}")]
    Protocol(String),
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("rejected by site: {0}")]
    Rejected(String),
}

impl BrowserError {
    /// Whether retrying the same operation can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout(_)
                | BrowserError::StaleElement(_)
                | BrowserError::Navigation(_)
                | BrowserError::Protocol(_)
        )
    }
}

/// Coarse classification of a fetch failure, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    ElementNotFound,
    NavigationFailed,
}

impl FetchErrorKind {
    pub fn from_cause(cause: &BrowserError) -> Self {
        match cause {
            BrowserError::Timeout(_) => FetchErrorKind::Timeout,
            BrowserError::NotFound(_) => FetchErrorKind::ElementNotFound,
            BrowserError::StaleElement(_)
            | BrowserError::Navigation(_)
            | BrowserError::Protocol(_)
            | BrowserError::Rejected(_) => FetchErrorKind::NavigationFailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::ElementNotFound => "element_not_found",
            FetchErrorKind::NavigationFailed => "navigation_failed",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of an operation the fetch gate could not complete.
#[derive(Debug, Clone, Error)]
#[error("{description} failed after {attempts} attempt(s) [{kind}]: {last_cause}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub description: String,
    pub attempts: u32,
    pub last_cause: BrowserError,
    pub elapsed: Duration,
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        self.kind == FetchErrorKind::ElementNotFound
    }
}

/// Structural problems with a single list row or detail page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("row has no title link")]
    MissingTitleLink,
    #[error("title link has no href")]
    MissingUrl,
    #[error("invalid article url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("article body not found")]
    MissingBody,
}

/// Why one row or one article could not be extracted.
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected: {0}")]
    InvalidCredentials(String),
    #[error("login form unusable ({field}): {detail}")]
    FormNotFound { field: &'static str, detail: String },
    #[error("no post-login marker appeared within {waited:?}")]
    VerificationTimeout { waited: Duration },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("article list could not be loaded: {0}")]
    ListUnavailable(#[source] FetchError),
    #[error("invalid site url: {0}")]
    SiteUrl(#[from] url::ParseError),
}
