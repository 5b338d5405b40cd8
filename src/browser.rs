use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ScrapeError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The browser capability a crawl session consumes. Kept narrow so the
/// session state machine can be driven by a scripted fake in tests.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate and wait for the load to settle, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Wait until `selector` is present, bounded by `timeout`.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ScrapeError>;

    async fn click(&mut self, selector: &str) -> Result<(), ScrapeError>;

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), ScrapeError>;

    /// Send a key press to the element at `selector`.
    async fn press_key(&mut self, selector: &str, key: &str) -> Result<(), ScrapeError>;

    /// Wait for the navigation triggered by a prior action to settle.
    async fn wait_for_navigation(&mut self, timeout: Duration) -> Result<(), ScrapeError>;

    /// Evaluate a JS expression in the page and return its JSON value.
    async fn evaluate_json(&mut self, expression: &str)
        -> Result<serde_json::Value, ScrapeError>;

    /// Release the page context. Always called, success or failure.
    async fn close(self);
}

/// One shared Chromium instance; sessions get their own page contexts.
pub struct Chromium {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl Chromium {
    pub async fn launch(headless: bool) -> Result<Self, ScrapeError> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(ScrapeError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Browser(format!("launch failed: {e}")))?;

        // The CDP handler must be polled for the browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    pub async fn new_page(&self) -> Result<ChromiumPage, ScrapeError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Browser(format!("new page: {e}")))?;
        Ok(ChromiumPage { page })
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        let nav = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, CdpError>(())
        };
        match tokio::time::timeout(timeout, nav).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ScrapeError::navigation(url, e)),
            Err(_) => Err(ScrapeError::navigation(
                url,
                format!("timed out after {timeout:?}"),
            )),
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ScrapeError> {
        let wait = async {
            loop {
                if self.page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ScrapeError::ElementNotFound {
                selector: selector.to_string(),
                timeout,
            })
    }

    async fn click(&mut self, selector: &str) -> Result<(), ScrapeError> {
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| ScrapeError::Browser(format!("{selector}: {e}")))?;
        el.click()
            .await
            .map_err(|e| ScrapeError::Browser(format!("click {selector}: {e}")))?;
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), ScrapeError> {
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| ScrapeError::Browser(format!("{selector}: {e}")))?;
        el.click()
            .await
            .map_err(|e| ScrapeError::Browser(format!("focus {selector}: {e}")))?
            .type_str(text)
            .await
            .map_err(|e| ScrapeError::Browser(format!("type into {selector}: {e}")))?;
        Ok(())
    }

    async fn press_key(&mut self, selector: &str, key: &str) -> Result<(), ScrapeError> {
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| ScrapeError::Browser(format!("{selector}: {e}")))?;
        el.press_key(key)
            .await
            .map_err(|e| ScrapeError::Browser(format!("press {key} on {selector}: {e}")))?;
        Ok(())
    }

    async fn wait_for_navigation(&mut self, timeout: Duration) -> Result<(), ScrapeError> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScrapeError::navigation("<pending navigation>", e)),
            Err(_) => Err(ScrapeError::navigation(
                "<pending navigation>",
                format!("timed out after {timeout:?}"),
            )),
        }
    }

    async fn evaluate_json(
        &mut self,
        expression: &str,
    ) -> Result<serde_json::Value, ScrapeError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| ScrapeError::Browser(format!("evaluate: {e}")))?;
        result
            .into_value()
            .map_err(|e| ScrapeError::Browser(format!("evaluate result: {e}")))
    }

    async fn close(self) {
        if let Err(e) = self.page.close().await {
            debug!("Page close: {}", e);
        }
    }
}
