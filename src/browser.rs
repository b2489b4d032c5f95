//! Headless Chromium backend driven over the DevTools protocol.

use crate::config::{SessionConfig, SettleConfig};
use crate::{BrowserBackend, BrowserError, RenderedPage};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Resolves once the DOM has not mutated for `{quiet_ms}` or `{max_wait_ms}` has passed.
const SETTLE_SCRIPT: &str = r#"
    new Promise((resolve) => {
        let quiet = null;
        let ceiling = null;
        const observer = new MutationObserver(() => {
            clearTimeout(quiet);
            quiet = setTimeout(() => finish('quiet'), {quiet_ms});
        });
        const finish = (reason) => {
            observer.disconnect();
            clearTimeout(quiet);
            clearTimeout(ceiling);
            resolve(reason);
        };
        observer.observe(document, { subtree: true, childList: true, attributes: true, characterData: true });
        quiet = setTimeout(() => finish('quiet'), {quiet_ms});
        ceiling = setTimeout(() => finish('ceiling'), {max_wait_ms});
    })
"#;

const INNER_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

#[derive(Default)]
pub struct ChromiumBackend {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl ChromiumBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    async fn launch(&mut self, config: &SessionConfig) -> Result<(), BrowserError> {
        if self.browser.is_some() {
            return Ok(());
        }

        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport.width, config.viewport.height)
            .viewport(Viewport {
                width: config.viewport.width,
                height: config.viewport.height,
                ..Viewport::default()
            })
            .request_timeout(Duration::from_millis(config.navigation_timeout_ms));

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--no-sandbox");

        let browser_config = builder.build().map_err(BrowserError::browser)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(BrowserError::browser)?;

        let task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("Browser launched");
        self.browser = Some(browser);
        self.handler = Some(task);
        Ok(())
    }

    async fn load(
        &mut self,
        url: &str,
        config: &SessionConfig,
    ) -> Result<RenderedPage, BrowserError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| BrowserError::browser("browser is not running"))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(BrowserError::browser)?;

        // page is closed whatever the load outcome
        let result = load_page(&page, url, config).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close page for {}: {}", url, e);
        }
        result
    }

    async fn shutdown(&mut self) -> Result<(), BrowserError> {
        let result = match self.browser.take() {
            Some(mut browser) => {
                let closed = browser.close().await.map(|_| ());
                if let Err(e) = browser.wait().await {
                    debug!("Waiting for browser exit failed: {}", e);
                }
                closed.map_err(BrowserError::browser)
            }
            None => Ok(()),
        };
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        result
    }

    fn abort(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        // dropping the Browser kills the child process
        self.browser = None;
    }
}

async fn load_page(
    page: &Page,
    url: &str,
    config: &SessionConfig,
) -> Result<RenderedPage, BrowserError> {
    page.execute(SetUserAgentOverrideParams::new(
        config.user_agent().to_string(),
    ))
    .await
    .map_err(BrowserError::browser)?;

    debug!("Navigating to {}", url);
    let timeout = Duration::from_millis(config.navigation_timeout_ms);
    match tokio::time::timeout(timeout, page.goto(url)).await {
        Err(_) => {
            return Err(BrowserError::Timeout {
                after_ms: config.navigation_timeout_ms,
            })
        }
        Ok(Err(e)) => return Err(classify(e.to_string(), config.navigation_timeout_ms)),
        Ok(Ok(_)) => {}
    }

    wait_for_settle(page, &config.settle).await;

    let html = page.content().await.map_err(BrowserError::browser)?;
    let text = match page.evaluate(INNER_TEXT_SCRIPT).await {
        Ok(value) => value.into_value::<String>().unwrap_or_default(),
        Err(e) => {
            debug!("Could not read innerText for {}: {}", url, e);
            String::new()
        }
    };
    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());

    Ok(RenderedPage {
        url: final_url,
        html,
        text,
    })
}

async fn wait_for_settle(page: &Page, settle: &SettleConfig) {
    let script = SETTLE_SCRIPT
        .replace("{quiet_ms}", &settle.quiet_ms.to_string())
        .replace("{max_wait_ms}", &settle.max_wait_ms.to_string());
    // the script enforces the ceiling itself, this only guards a hung evaluation
    let guard = Duration::from_millis(settle.max_wait_ms + 2_000);

    match tokio::time::timeout(guard, page.evaluate(script)).await {
        Ok(Ok(result)) => {
            let reason: String = result
                .into_value()
                .unwrap_or_else(|_| "unknown".to_string());
            debug!("Page settled ({})", reason);
        }
        Ok(Err(e)) => debug!("Could not observe DOM mutations: {}", e),
        Err(_) => warn!("Timeout waiting for page to settle"),
    }
}

fn classify(message: String, after_ms: u64) -> BrowserError {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        BrowserError::Timeout { after_ms }
    } else if lower.contains("net::err") {
        BrowserError::Network { message }
    } else {
        BrowserError::Browser { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cdp_errors_are_classified() {
        assert_eq!(
            classify("Request timed out.".to_string(), 500),
            BrowserError::Timeout { after_ms: 500 }
        );
        assert_eq!(
            classify("net::ERR_NAME_NOT_RESOLVED".to_string(), 500),
            BrowserError::Network {
                message: "net::ERR_NAME_NOT_RESOLVED".to_string()
            }
        );
        assert!(matches!(
            classify("Target closed".to_string(), 500),
            BrowserError::Browser { .. }
        ));
    }
}
