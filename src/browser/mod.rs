//! The browser capability the pipeline drives.
//!
//! [`Browser`] is deliberately small: navigation, element lookup, reading
//! text and attributes, clicking, typing and screenshots. Everything that
//! knows about the dashboard's markup lives in [`crate::pages`], and every
//! call is routed through [`crate::gate::FetchGate`].
//!
//! # Implementations
//!
//! | Type | Module | Notes |
//! |------|--------|-------|
//! | [`chrome::ChromeBrowser`] | [`chrome`] | Chromium over CDP via `chromiumoxide` |
//! | `fake::FakeBrowser` | `fake` | Scripted site, test builds only |

use crate::errors::BrowserError;
use tokio::sync::{Mutex, MutexGuard};

pub mod chrome;
#[cfg(test)]
pub mod fake;

/// One browser tab the pipeline can drive.
///
/// Lookups that match nothing fail with [`BrowserError::NotFound`]
/// (`find_elements` returns an empty list instead).
#[allow(async_fn_in_trait)]
pub trait Browser {
    /// Handle to an element on the current page.
    type Element;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn find_element(&self, selector: &str) -> Result<Self::Element, BrowserError>;

    async fn find_elements(&self, selector: &str) -> Result<Vec<Self::Element>, BrowserError>;

    /// Look up `selector` among the descendants of `parent`.
    async fn find_within(
        &self,
        parent: &Self::Element,
        selector: &str,
    ) -> Result<Self::Element, BrowserError>;

    async fn read_text(&self, element: &Self::Element) -> Result<String, BrowserError>;

    async fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    async fn click(&self, element: &Self::Element) -> Result<(), BrowserError>;

    async fn fill_field(&self, element: &Self::Element, value: &str) -> Result<(), BrowserError>;

    /// PNG screenshot of the current page.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn page_source(&self) -> Result<String, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Exclusive access to the single browser a run owns.
///
/// Only one navigation or interaction may be in flight against the tab, so
/// every stage acquires the slot for the whole sequence of calls that depend
/// on the current page. Waiters are served in FIFO order.
pub struct BrowserSlot<B> {
    browser: Mutex<B>,
}

impl<B: Browser> BrowserSlot<B> {
    pub fn new(browser: B) -> Self {
        Self {
            browser: Mutex::new(browser),
        }
    }

    pub async fn acquire(&self) -> MutexGuard<'_, B> {
        self.browser.lock().await
    }

    /// Give up the slot and shut the browser down.
    pub async fn release(self) -> Result<(), BrowserError> {
        let mut browser = self.browser.into_inner();
        browser.close().await
    }
}
