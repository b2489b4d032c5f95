#![allow(dead_code)]

use async_trait::async_trait;
use prospect_crawler::image::ImageResolver;
use prospect_crawler::retry::{PacingWindow, RetryPolicy};
use prospect_crawler::{
    BrowserBackend, BrowserError, DownloadedImage, ImageConfig, ImageError, ImageSource,
    RenderedPage, ScraperConfig, SessionConfig,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const BASE_URL: &str = "https://www.nfldraftbuzz.com";

pub fn fixture(name: &str) -> String {
    fs::read_to_string(format!("tests/htmls/{}", name)).expect("Invalid file path")
}

pub fn player_url(slug: &str) -> String {
    format!("{}/Player/{}", BASE_URL, slug)
}

/// No waiting anywhere, `max_attempts` per navigation, portraits under `photos`.
pub fn config(max_attempts: u32, photos: &Path) -> ScraperConfig {
    ScraperConfig {
        base_url: BASE_URL.to_string(),
        session: SessionConfig {
            retry: RetryPolicy::immediate(max_attempts),
            pacing: PacingWindow::disabled(),
            ..SessionConfig::default()
        },
        images: ImageConfig {
            enabled: true,
            storage_dir: photos.to_path_buf(),
            retry: RetryPolicy::immediate(2),
        },
    }
}

/// Portrait downloads answered by [`FakeImages`], stored where `config` says.
pub fn images(config: &ScraperConfig) -> Option<ImageResolver<FakeImages>> {
    Some(ImageResolver::new(FakeImages, &config.images))
}

#[derive(Clone)]
pub enum Script {
    Page(String),
    /// Times out this many times, then serves the page.
    Flaky(u32, String),
    AlwaysTimeout,
}

#[derive(Default)]
pub struct Counters {
    pub launches: AtomicU32,
    pub shutdowns: AtomicU32,
    loads: Mutex<HashMap<String, u32>>,
}

impl Counters {
    pub fn loads(&self, url: &str) -> u32 {
        self.loads
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_loads(&self) -> u32 {
        self.loads.lock().unwrap().values().sum()
    }
}

/// Serves scripted pages keyed by absolute URL. Unknown URLs time out.
pub struct FakeBrowser {
    pages: HashMap<String, Script>,
    counters: Arc<Counters>,
    cancel_after: Option<(u32, CancellationToken)>,
    launch_error: Option<BrowserError>,
}

impl FakeBrowser {
    pub fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let browser = FakeBrowser {
            pages: HashMap::new(),
            counters: counters.clone(),
            cancel_after: None,
            launch_error: None,
        };
        (browser, counters)
    }

    pub fn serve(mut self, url: &str, script: Script) -> Self {
        self.pages.insert(url.to_string(), script);
        self
    }

    /// Every launch fails with `error`.
    pub fn fail_launch(mut self, error: BrowserError) -> Self {
        self.launch_error = Some(error);
        self
    }

    /// Cancels `token` once `loads` page loads have been served.
    pub fn cancel_after(mut self, loads: u32, token: CancellationToken) -> Self {
        self.cancel_after = Some((loads, token));
        self
    }
}

#[async_trait]
impl BrowserBackend for FakeBrowser {
    async fn launch(&mut self, _config: &SessionConfig) -> Result<(), BrowserError> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        match &self.launch_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn load(&mut self, url: &str, config: &SessionConfig) -> Result<RenderedPage, BrowserError> {
        let attempt = {
            let mut loads = self.counters.loads.lock().unwrap();
            let count = loads.entry(url.to_string()).or_default();
            *count += 1;
            *count
        };
        if let Some((after, token)) = &self.cancel_after {
            if self.counters.total_loads() >= *after {
                token.cancel();
            }
        }

        let timeout = BrowserError::Timeout {
            after_ms: config.navigation_timeout_ms,
        };
        let html = match self.pages.get(url) {
            Some(Script::Page(html)) => html.clone(),
            Some(Script::Flaky(failures, html)) if attempt > *failures => html.clone(),
            _ => return Err(timeout),
        };
        Ok(RenderedPage {
            url: url.to_string(),
            html,
            text: String::new(),
        })
    }

    async fn shutdown(&mut self) -> Result<(), BrowserError> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers every request with a small JPEG-typed body.
pub struct FakeImages;

#[async_trait]
impl ImageSource for FakeImages {
    async fn get(&self, _url: &Url) -> Result<DownloadedImage, ImageError> {
        Ok(DownloadedImage {
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            content_type: Some("image/jpeg".to_string()),
        })
    }
}
