//! Owns the single browser instance of a run and makes navigation resilient.

use crate::config::SessionConfig;
use crate::retry::Pacer;
use crate::{utils, BrowserBackend, BrowserError, NavigationFailed, RenderedPage};
use lazy_regex::regex;
use scraper::Html;
use tracing::{debug, info, warn};

/// Lower-cased `<title>` fragments of interstitial and block pages.
const CHALLENGE_TITLES: &[&str] = &[
    "just a moment",
    "attention required",
    "access denied",
    "checking your browser",
    "verify you are human",
];

/// Markup that only the challenge interstitial itself carries.
const CHALLENGE_MARKUP: &[&str] = &[
    "cf-challenge-running",
    "cf_chl_opt",
    "cf-chl-widget",
    "cf-browser-verification",
];

/// Phrases that mean a challenge only when the page has next to no other text.
const CHALLENGE_PHRASES: &[&str] = &[
    "verify you are human",
    "checking your browser before accessing",
    "enable javascript and cookies to continue",
];

const MAX_CHALLENGE_WORDS: usize = 50;

/// Marker of a challenge or block page, `None` for a regular page.
///
/// Scripts a protection layer injects into ordinary pages and narrative text
/// mentioning the same words do not count.
pub fn detect_challenge(page: &RenderedPage) -> Option<&'static str> {
    let html = page.html.to_lowercase();

    let title = regex!(r"(?is)<title[^>]*>(.*?)</title>")
        .captures(&html)
        .and_then(|caps| caps.get(1))
        .map(|m| utils::normalize_whitespace(m.as_str()))
        .unwrap_or_default();
    if let Some(marker) = CHALLENGE_TITLES.iter().copied().find(|m| title.contains(m)) {
        return Some(marker);
    }

    if let Some(marker) = CHALLENGE_MARKUP.iter().copied().find(|m| html.contains(m)) {
        return Some(marker);
    }

    let phrase = CHALLENGE_PHRASES.iter().copied().find(|p| html.contains(p))?;
    let text = if page.text.trim().is_empty() {
        utils::visible_text(Html::parse_document(&page.html).root_element())
    } else {
        page.text.clone()
    };
    let text = text.to_lowercase();
    (text.contains(phrase) && text.split_whitespace().count() < MAX_CHALLENGE_WORDS)
        .then_some(phrase)
}

pub struct SessionManager<B: BrowserBackend> {
    backend: B,
    config: SessionConfig,
    pacer: Pacer,
    open: bool,
}

impl<B: BrowserBackend> SessionManager<B> {
    pub async fn open(mut backend: B, config: SessionConfig) -> Result<Self, BrowserError> {
        info!(
            "Opening browser session (headless={}, viewport={}x{})",
            config.headless, config.viewport.width, config.viewport.height
        );
        backend.launch(&config).await?;
        Ok(SessionManager {
            pacer: Pacer::new(config.pacing.clone()),
            backend,
            config,
            open: true,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Loads `url`, retrying with backoff. A failure here leaves the session usable.
    pub async fn navigate(&mut self, url: &str) -> Result<RenderedPage, NavigationFailed> {
        self.pacer.wait().await;

        let policy = self.config.retry.clone();
        let attempts = policy.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("Visit {} (attempt {}/{})", url, attempt, attempts);
            let outcome = match self.backend.load(url, &self.config).await {
                Ok(page) => match detect_challenge(&page) {
                    Some(marker) => Err(BrowserError::Challenge {
                        marker: marker.to_string(),
                    }),
                    None => Ok(page),
                },
                Err(e) => Err(e),
            };

            match outcome {
                Ok(page) => {
                    self.pacer.mark_success();
                    return Ok(page);
                }
                Err(e) => {
                    warn!(
                        "Navigation to {} failed (attempt {}/{}): {}",
                        url, attempt, attempts, e
                    );
                    if e.needs_relaunch() {
                        self.relaunch().await;
                    }
                    last_error = Some(e);
                    if attempt < attempts {
                        policy.sleep_after(attempt).await;
                    }
                }
            }
        }

        Err(NavigationFailed {
            url: url.to_string(),
            attempts,
            cause: last_error.unwrap_or_else(|| BrowserError::browser("no attempt was made")),
        })
    }

    async fn relaunch(&mut self) {
        warn!("Browser connection lost, relaunching");
        if let Err(e) = self.backend.shutdown().await {
            debug!("Shutdown before relaunch failed: {}", e);
        }
        if let Err(e) = self.backend.launch(&self.config).await {
            warn!("Relaunch failed: {}", e);
        }
    }

    pub async fn close(mut self) -> Result<(), BrowserError> {
        self.open = false;
        info!("Closing browser session");
        self.backend.shutdown().await
    }
}

impl<B: BrowserBackend> Drop for SessionManager<B> {
    fn drop(&mut self) {
        if self.open {
            warn!("Browser session dropped without close, aborting it");
            self.backend.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{PacingWindow, RetryPolicy};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        launches: AtomicU32,
        loads: AtomicU32,
        shutdowns: AtomicU32,
        aborts: AtomicU32,
    }

    struct ScriptedBackend {
        script: VecDeque<Result<String, BrowserError>>,
        counters: Arc<Counters>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<&str, BrowserError>>) -> (Self, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            let backend = ScriptedBackend {
                script: script
                    .into_iter()
                    .map(|r| r.map(ToString::to_string))
                    .collect(),
                counters: Arc::clone(&counters),
            };
            (backend, counters)
        }
    }

    #[async_trait]
    impl BrowserBackend for ScriptedBackend {
        async fn launch(&mut self, _config: &SessionConfig) -> Result<(), BrowserError> {
            self.counters.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn load(
            &mut self,
            url: &str,
            _config: &SessionConfig,
        ) -> Result<RenderedPage, BrowserError> {
            self.counters.loads.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(Ok(html)) => Ok(RenderedPage {
                    url: url.to_string(),
                    html,
                    text: String::new(),
                }),
                Some(Err(e)) => Err(e),
                None => Err(BrowserError::Timeout { after_ms: 10 }),
            }
        }

        async fn shutdown(&mut self) -> Result<(), BrowserError> {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn abort(&mut self) {
            self.counters.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(max_attempts: u32) -> SessionConfig {
        SessionConfig {
            retry: RetryPolicy::immediate(max_attempts),
            pacing: PacingWindow::disabled(),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_ceiling() {
        let (backend, counters) = ScriptedBackend::new(vec![]);
        let mut session = SessionManager::open(backend, config(3)).await.unwrap();

        let err = session.navigate("https://example.com/a").await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.url, "https://example.com/a");
        assert_eq!(err.cause, BrowserError::Timeout { after_ms: 10 });
        assert_eq!(counters.loads.load(Ordering::SeqCst), 3);

        session.close().await.unwrap();
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(counters.aborts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recovers_from_a_transient_failure() {
        let (backend, counters) = ScriptedBackend::new(vec![
            Err(BrowserError::network("connection reset")),
            Ok("<html><body>ok</body></html>"),
        ]);
        let mut session = SessionManager::open(backend, config(3)).await.unwrap();

        let page = session.navigate("https://example.com/a").await.unwrap();
        assert!(page.html.contains("ok"));
        assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn challenge_pages_are_retried() {
        let (backend, counters) = ScriptedBackend::new(vec![
            Ok("<html><title>Just a moment...</title></html>"),
            Ok("<html><title>Just a moment...</title></html>"),
        ]);
        let mut session = SessionManager::open(backend, config(2)).await.unwrap();

        let err = session.navigate("https://example.com/a").await.unwrap_err();
        assert_eq!(
            err.cause,
            BrowserError::Challenge {
                marker: "just a moment".to_string()
            }
        );
        assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn session_stays_usable_after_exhausted_retries() {
        let (backend, _) = ScriptedBackend::new(vec![
            Err(BrowserError::network("dns")),
            Ok("<html><body>second target</body></html>"),
        ]);
        let mut session = SessionManager::open(backend, config(1)).await.unwrap();

        assert!(session.navigate("https://example.com/a").await.is_err());
        let page = session.navigate("https://example.com/b").await.unwrap();
        assert_eq!(page.url, "https://example.com/b");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn lost_browser_is_relaunched_before_the_next_attempt() {
        let (backend, counters) = ScriptedBackend::new(vec![
            Err(BrowserError::browser("Target closed")),
            Ok("<html><body>back</body></html>"),
        ]);
        let mut session = SessionManager::open(backend, config(3)).await.unwrap();

        assert!(session.navigate("https://example.com/a").await.is_ok());
        assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_an_open_session_aborts_the_browser() {
        let (backend, counters) = ScriptedBackend::new(vec![]);
        let session = SessionManager::open(backend, config(1)).await.unwrap();
        drop(session);
        assert_eq!(counters.aborts.load(Ordering::SeqCst), 1);
    }

    fn rendered(html: &str) -> RenderedPage {
        RenderedPage {
            url: "https://example.com/a".to_string(),
            html: html.to_string(),
            text: String::new(),
        }
    }

    #[test]
    fn regular_pages_are_not_challenges() {
        assert_eq!(
            detect_challenge(&rendered(
                "<html><title>Dante Moore | Draft Profile</title></html>"
            )),
            None
        );
        assert_eq!(
            detect_challenge(&rendered("<div id=\"cf-challenge-running\"></div>")),
            Some("cf-challenge-running")
        );
    }

    #[test]
    fn injected_protection_scripts_do_not_make_a_challenge() {
        let page = rendered(
            r#"<html><head><title>Dante Moore QB UCLA | Draft Profile</title>
            <script src="/cdn-cgi/challenge-platform/scripts/jsd/main.js"></script></head>
            <body><h1>Dante Moore</h1><p>Quick release.</p></body></html>"#,
        );
        assert_eq!(detect_challenge(&page), None);
    }

    #[test]
    fn narrative_text_never_matches_block_wording() {
        let prose = rendered(
            "<html><title>Arch Manning | Draft Profile</title><body>\
             <p>He was access denied to the starting job as a freshman.</p></body></html>",
        );
        assert_eq!(detect_challenge(&prose), None);

        let long = format!(
            "<html><title>Draft Profile</title><body><p>{} Teams want to verify you are human enough to lead.</p></body></html>",
            "He reads the field well. ".repeat(20)
        );
        assert_eq!(detect_challenge(&rendered(&long)), None);
    }

    #[test]
    fn challenge_titles_and_near_empty_interstitials_are_detected() {
        assert_eq!(
            detect_challenge(&rendered(
                "<html><title>Access denied | nfldraftbuzz.com used Cloudflare</title></html>"
            )),
            Some("access denied")
        );
        assert_eq!(
            detect_challenge(&rendered(
                "<html><title>nfldraftbuzz.com</title><body><p>Verify you are human by completing the action below.</p></body></html>"
            )),
            Some("verify you are human")
        );
    }
}
