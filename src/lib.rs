use async_trait::async_trait;
use url::Url;

pub mod aggregator;
pub mod config;
pub mod data;
pub mod extract;
pub mod fetcher;
pub mod image;
pub mod prospect;
pub mod retry;
pub mod roster;
pub mod session;

#[cfg(feature = "browser")]
pub mod browser;

mod error;
mod utils;

pub use aggregator::{ProspectAggregator, RunReport};
pub use config::{ImageConfig, ScraperConfig, SessionConfig};
pub use data::{ProspectStore, Table};
pub use error::{
    BrowserError, CrawlerError, ExtractionError, FailureKind, FetchError, ImageError,
    NavigationFailed,
};
pub use extract::Extraction;
pub use fetcher::{FetchedPage, PageFetcher};
pub use prospect::{FieldWarning, Prospect, WarningKind};
pub use roster::RosterDiscovery;
pub use session::SessionManager;

/// What one successful page load hands back: the settled DOM serialized as
/// HTML, and the page's visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    pub text: String,
}

/// One automated browser. Implementations perform a single attempt per call;
/// retries, pacing and challenge detection belong to [`SessionManager`].
#[async_trait]
pub trait BrowserBackend: Send {
    async fn launch(&mut self, config: &SessionConfig) -> Result<(), BrowserError>;

    /// Loads `url` and returns once the page has settled.
    async fn load(&mut self, url: &str, config: &SessionConfig)
        -> Result<RenderedPage, BrowserError>;

    async fn shutdown(&mut self) -> Result<(), BrowserError>;

    /// Last-resort synchronous cleanup when a session is dropped without `shutdown`.
    fn abort(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn get(&self, url: &Url) -> Result<DownloadedImage, ImageError>;
}

/// Turns a fetched page into one typed part of a [`Prospect`].
///
/// Extractors never fail: missing or broken data comes back as an absent value
/// plus [`FieldWarning`]s.
pub trait FieldExtractor {
    type Value;

    fn field(&self) -> &'static str;
    fn extract(&self, page: &FetchedPage) -> Extraction<Self::Value>;
}
