//! Failure diagnostics.
//!
//! When an operation exhausts its retries, or a run hits a fatal error, the
//! pipeline assembles a [`DiagnosticCapture`] (screenshot, page source and a
//! small state snapshot) and hands it to a [`DiagnosticsSink`]. Where and how
//! captures are stored is entirely up to the sink.
//!
//! # Output Structure
//!
//! [`FileDiagnostics`] lays captures out under the output directory:
//! ```text
//! output/
//! ├── screenshots/
//! │   └── login_failed_20250506203000123_0.png
//! └── debug/
//!     ├── login_failed_20250506203000123_0.json
//!     └── login_failed_20250506203000123_0.html
//! ```
//!
//! File stems carry a millisecond timestamp and a per-sink sequence number,
//! so two captures with the same tag never overwrite each other.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{error, info};

/// Everything recorded about one failure.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticCapture {
    /// File-name friendly label, e.g. `login_failed`.
    pub tag: String,
    pub description: String,
    pub captured_at: DateTime<Utc>,
    pub url: Option<String>,
    pub attempts: u32,
    pub cause: String,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    #[serde(skip)]
    pub page_source: Option<String>,
}

/// Receives captures from the fetch gate.
///
/// Returns a boxed future so the gate can hold the sink as `&dyn`.
pub trait DiagnosticsSink: Send + Sync {
    fn submit(&self, capture: DiagnosticCapture) -> BoxFuture<'_, ()>;
}

/// Writes captures below an output directory.
#[derive(Debug, Clone)]
pub struct FileDiagnostics {
    root: PathBuf,
    sequence: Arc<AtomicU64>,
}

impl FileDiagnostics {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    fn stem(&self, capture: &DiagnosticCapture) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_{seq}",
            capture.tag,
            capture.captured_at.format("%Y%m%d%H%M%S%3f")
        )
    }

    async fn write(&self, capture: &DiagnosticCapture) -> io::Result<Vec<PathBuf>> {
        let stem = self.stem(capture);
        let mut written = Vec::new();

        if let Some(png) = &capture.screenshot {
            let dir = self.root.join("screenshots");
            fs::create_dir_all(&dir).await?;
            let path = dir.join(format!("{stem}.png"));
            fs::write(&path, png).await?;
            written.push(path);
        }

        let dir = self.root.join("debug");
        fs::create_dir_all(&dir).await?;
        let state_path = dir.join(format!("{stem}.json"));
        let state = serde_json::to_vec_pretty(capture).map_err(io::Error::other)?;
        fs::write(&state_path, state).await?;
        written.push(state_path);

        if let Some(html) = &capture.page_source {
            let path = dir.join(format!("{stem}.html"));
            fs::write(&path, html).await?;
            written.push(path);
        }

        Ok(written)
    }
}

impl DiagnosticsSink for FileDiagnostics {
    fn submit(&self, capture: DiagnosticCapture) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self.write(&capture).await {
                Ok(paths) => info!(tag = %capture.tag, files = paths.len(), "Saved diagnostics"),
                Err(e) => error!(tag = %capture.tag, error = %e, "Failed to save diagnostics"),
            }
        })
    }
}

/// Keeps captures in memory; used by tests to assert when captures happen.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    captures: std::sync::Mutex<Vec<DiagnosticCapture>>,
}

#[cfg(test)]
impl MemoryDiagnostics {
    pub fn tags(&self) -> Vec<String> {
        self.captures
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.tag.clone())
            .collect()
    }

    pub fn captures(&self) -> Vec<DiagnosticCapture> {
        self.captures.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl DiagnosticsSink for MemoryDiagnostics {
    fn submit(&self, capture: DiagnosticCapture) -> BoxFuture<'_, ()> {
        self.captures.lock().unwrap().push(capture);
        Box::pin(std::future::ready(()))
    }
}
