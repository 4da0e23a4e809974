//! Exclusive browser session for scroll-driven page fetching.
//!
//! One [`BrowserSession`] owns one headless Chrome instance for the duration
//! of a single harvest attempt. Creation launches the browser with
//! anti-automation flags and a fixed user-agent, then navigates to the
//! date-scoped query target; teardown always runs, escalating to a forced
//! process kill if the graceful close fails. Sessions are never shared
//! between attempts or reused.
//!
//! The harvester itself depends only on the [`PageFetcher`] capability, so
//! tests can drive the loop with scripted snapshots and heights instead of
//! a real browser.

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HarvestConfig;

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";
const PAGE_HEIGHT: &str = "document.body.scrollHeight";

/// Pause after navigation so the first batch of results can render.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Failures raised by session creation and page operations.
///
/// Every variant is classified transient by the retry controller: browser
/// infrastructure that failed to start, navigate, or answer may well recover
/// on a fresh attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser failed to launch: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("navigation to {url} timed out after {seconds}s")]
    NavigationTimeout { url: String, seconds: u64 },
    #[error("page operation failed: {0}")]
    Page(String),
}

/// Page operations the harvester drives.
///
/// [`BrowserSession`] is the production implementation; tests provide a
/// deterministic scripted one. Construction and teardown stay on the
/// concrete types; ownership already guarantees a session cannot be used
/// after it is closed.
pub trait PageFetcher {
    /// Full HTML snapshot of the current DOM.
    async fn snapshot(&self) -> Result<String, SessionError>;
    /// Scroll the viewport to the bottom of the document.
    async fn scroll_to_bottom(&self) -> Result<(), SessionError>;
    /// Current document height in CSS pixels.
    async fn current_height(&self) -> Result<i64, SessionError>;
}

/// An exclusive handle to one launched browser, parked on the query page.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a browser and navigate it to the harvest target.
    ///
    /// Launch failures, navigation failures, and page-load timeouts all
    /// surface as [`SessionError`]; the half-started browser is torn down
    /// before the error is returned.
    pub async fn open(config: &HarvestConfig, target_url: &str) -> Result<Self, SessionError> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", config.user_agent));
        if let Some(ref binary) = config.browser_binary {
            builder = builder.chrome_executable(binary.clone());
        }
        let browser_config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        debug!("Browser launched");

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                teardown(browser, handler).await;
                return Err(SessionError::Launch(e.to_string()));
            }
        };

        let nav_timeout = Duration::from_secs(config.nav_timeout_secs);
        match tokio::time::timeout(nav_timeout, page.goto(target_url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                teardown(browser, handler).await;
                return Err(SessionError::Navigation {
                    url: target_url.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                teardown(browser, handler).await;
                return Err(SessionError::NavigationTimeout {
                    url: target_url.to_string(),
                    seconds: config.nav_timeout_secs,
                });
            }
        }
        tokio::time::sleep(SETTLE_DELAY).await;

        info!(url = %target_url, "Browser session ready");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Release the session, always.
    ///
    /// Consumes the handle, so a closed session cannot be touched again.
    pub async fn close(self) {
        teardown(self.browser, self.handler).await;
    }
}

/// Graceful close with a forced-kill fallback.
///
/// Teardown failures are logged and swallowed: cleanup must never mask the
/// result of the attempt that owned this session.
async fn teardown(mut browser: Browser, handler: JoinHandle<()>) {
    match browser.close().await {
        Ok(_) => {
            let _ = browser.wait().await;
            debug!("Browser closed");
        }
        Err(e) => {
            warn!(error = %e, "Graceful browser close failed; force-killing the process");
            if let Some(Err(kill_err)) = browser.kill().await {
                warn!(error = %kill_err, "Force kill failed; a browser process may linger");
            }
        }
    }
    handler.abort();
}

impl PageFetcher for BrowserSession {
    async fn snapshot(&self) -> Result<String, SessionError> {
        self.page
            .content()
            .await
            .map_err(|e| SessionError::Page(e.to_string()))
    }

    async fn scroll_to_bottom(&self) -> Result<(), SessionError> {
        self.page
            .evaluate(SCROLL_TO_BOTTOM)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Page(e.to_string()))
    }

    async fn current_height(&self) -> Result<i64, SessionError> {
        let result = self
            .page
            .evaluate(PAGE_HEIGHT)
            .await
            .map_err(|e| SessionError::Page(e.to_string()))?;
        let value: serde_json::Value = result
            .into_value()
            .map_err(|e| SessionError::Page(format!("page height missing: {e}")))?;
        value
            .as_i64()
            .ok_or_else(|| SessionError::Page(format!("page height was not numeric: {value}")))
    }
}
