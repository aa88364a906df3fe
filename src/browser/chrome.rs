//! Chromium over the DevTools protocol.
//!
//! Launches a local Chromium with `chromiumoxide`, opens a single tab and
//! implements [`Browser`] against it. The CDP event handler is driven by a
//! spawned task for the lifetime of the browser.

use super::Browser;
use crate::errors::BrowserError;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig, Element, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub struct ChromeBrowser {
    browser: CdpBrowser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeBrowser {
    /// Launch Chromium and open a blank tab.
    #[instrument(level = "info")]
    pub async fn launch(headless: bool, request_timeout: Duration) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(request_timeout)
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Protocol)?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| BrowserError::Protocol(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| classify(e, "open tab"))?;

        info!(headless, "Chromium launched");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }
}

/// Map a CDP failure onto the transient/permanent taxonomy.
fn classify(error: CdpError, context: &str) -> BrowserError {
    let detail = format!("{context}: {error}");
    match error {
        CdpError::Timeout => BrowserError::Timeout(detail),
        CdpError::NotFound => BrowserError::NotFound(detail),
        CdpError::Chrome(ref e) => classify_message(&e.message, detail),
        CdpError::ChromeMessage(ref message) => classify_message(message, detail),
        _ => BrowserError::Protocol(detail),
    }
}

/// Chrome reports a missing node or a stale execution context only in the
/// message text.
fn classify_message(message: &str, detail: String) -> BrowserError {
    if message.contains("Could not find node") || message.contains("No node") {
        BrowserError::NotFound(detail)
    } else if message.contains("detached") || message.contains("Cannot find context") {
        BrowserError::StaleElement(detail)
    } else {
        BrowserError::Protocol(detail)
    }
}

impl Browser for ChromeBrowser {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!(%url, "goto");
        match self.page.goto(url).await {
            Ok(_) => Ok(()),
            Err(CdpError::Timeout) => Err(BrowserError::Timeout(format!("goto {url}"))),
            Err(e) => Err(BrowserError::Navigation(format!("goto {url}: {e}"))),
        }
    }

    async fn find_element(&self, selector: &str) -> Result<Element, BrowserError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| classify(e, selector))
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Element>, BrowserError> {
        match self.page.find_elements(selector).await {
            Ok(elements) => Ok(elements),
            Err(e) => match classify(e, selector) {
                BrowserError::NotFound(_) => Ok(Vec::new()),
                other => Err(other),
            },
        }
    }

    async fn find_within(&self, parent: &Element, selector: &str) -> Result<Element, BrowserError> {
        parent
            .find_element(selector)
            .await
            .map_err(|e| classify(e, selector))
    }

    async fn read_text(&self, element: &Element) -> Result<String, BrowserError> {
        let text = element
            .inner_text()
            .await
            .map_err(|e| classify(e, "inner_text"))?;
        Ok(text.unwrap_or_default())
    }

    async fn read_attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        element
            .attribute(name)
            .await
            .map_err(|e| classify(e, name))
    }

    async fn click(&self, element: &Element) -> Result<(), BrowserError> {
        element.click().await.map_err(|e| classify(e, "click"))?;
        Ok(())
    }

    async fn fill_field(&self, element: &Element, value: &str) -> Result<(), BrowserError> {
        element
            .click()
            .await
            .map_err(|e| classify(e, "focus field"))?
            .type_str(value)
            .await
            .map_err(|e| classify(e, "type"))?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| classify(e, "screenshot"))
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = self.page.url().await.map_err(|e| classify(e, "url"))?;
        Ok(url.unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(|e| classify(e, "content"))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        info!("Closing browser");
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| classify(e, "close"));
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        self.handler.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_timeout_is_transient() {
        let err = classify(CdpError::Timeout, "goto");
        assert!(matches!(err, BrowserError::Timeout(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_missing_node_is_permanent() {
        let err = classify(
            CdpError::ChromeMessage("Could not find node with given id".to_string()),
            ".next-page",
        );
        assert!(matches!(err, BrowserError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_protocol_error_without_match_is_not_found() {
        let err = classify(
            CdpError::Chrome(chromiumoxide::types::Error {
                code: -32000,
                message: "Could not find node with given id".to_string(),
            }),
            ".o-statsContent__tableDate",
        );
        assert!(matches!(err, BrowserError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_other_protocol_error_is_transient() {
        let err = classify(
            CdpError::Chrome(chromiumoxide::types::Error {
                code: -32000,
                message: "Target closed".to_string(),
            }),
            "click",
        );
        assert!(matches!(err, BrowserError::Protocol(_)));
    }

    #[test]
    fn test_classify_detached_node_is_stale() {
        let err = classify(
            CdpError::ChromeMessage("Node is detached from document".to_string()),
            "click",
        );
        assert!(matches!(err, BrowserError::StaleElement(_)));
    }
}
