//! Portrait lookup and download.

use crate::config::ImageConfig;
use crate::extract::Extraction;
use crate::prospect::ImageRef;
use crate::retry::RetryPolicy;
use crate::{utils, DownloadedImage, FetchedPage, ImageError, ImageSource};
use async_trait::async_trait;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

const FIELD: &str = "image";

/// Lower-cased fragments of image sources that are never a portrait.
const SKIP_PATTERNS: &[&str] = &[
    "logo",
    "icon",
    "favicon",
    "sprite",
    "sponsor",
    "badge",
    "button",
    "/ads/",
    "advert",
    "pixel",
    "spacer",
    "placeholder",
    "1x1",
];

const E: &str = "Invalid selector";
lazy_static! {
    /// Dedicated profile regions first, generic first-image fallbacks last.
    static ref CANDIDATES: Vec<Selector> = [
        r#"[data-section="profile"] img"#,
        ".player-image img",
        ".profile-image img",
        r#"img[src*="headshot"]"#,
        r#"img[src*="Imagn"], img[src*="imagn"]"#,
        r#"img[src*="player"], img[src*="Player"]"#,
        r#"img[src*="photo"]"#,
        "article img",
        "main img",
        "img",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect(E))
    .collect();
}

/// Most likely portrait on the page, resolved against the page URL.
///
/// Pure: the same document always yields the same candidate.
pub fn candidate(document: &Html, base: &Url) -> Option<Url> {
    CANDIDATES.iter().find_map(|selector| {
        document
            .select(selector)
            .filter_map(|img| image_source(img).map(|src| (img, src)))
            .filter(|(img, src)| !is_skipped(*img, src))
            .find_map(|(_, src)| {
                base.join(src)
                    .ok()
                    .filter(|url| matches!(url.scheme(), "http" | "https"))
            })
    })
}

fn image_source<'a>(img: ElementRef<'a>) -> Option<&'a str> {
    let element = img.value();
    let lazy = ["data-src", "data-lazy-src", "data-original"]
        .iter()
        .find_map(|attr| element.attr(attr));
    let srcset = element
        .attr("srcset")
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.split_whitespace().next());

    [element.attr("src"), lazy, srcset]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
}

fn is_skipped(img: ElementRef<'_>, src: &str) -> bool {
    let src = src.to_lowercase();
    let tiny = ["width", "height"]
        .iter()
        .any(|attr| matches!(img.value().attr(attr), Some("0" | "1")));
    tiny || SKIP_PATTERNS.iter().any(|p| src.contains(p))
}

/// File extension for a response content type.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let content_type = content_type.unwrap_or_default().to_lowercase();
    if content_type.contains("png") {
        "png"
    } else if content_type.contains("gif") {
        "gif"
    } else if content_type.contains("webp") {
        "webp"
    } else {
        "jpeg"
    }
}

fn is_retryable(error: &ImageError) -> bool {
    match error {
        ImageError::Status(status) => *status == 408 || *status == 429 || *status >= 500,
        ImageError::Storage(_) => false,
        ImageError::Request(_) | ImageError::Empty => true,
    }
}

pub struct ImageResolver<S: ImageSource> {
    source: S,
    retry: RetryPolicy,
    storage_dir: PathBuf,
}

impl<S: ImageSource> ImageResolver<S> {
    pub fn new(source: S, config: &ImageConfig) -> Self {
        ImageResolver {
            source,
            retry: config.retry.clone(),
            storage_dir: config.storage_dir.clone(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Finds and downloads the portrait of `page`. `key` names the stored file,
    /// normally the profile slug so that namesakes never share one.
    pub async fn resolve(&self, page: &FetchedPage, key: &str) -> Extraction<ImageRef> {
        let url = candidate(&page.document, &page.url);
        self.download(url, key).await
    }

    /// Download half of [`ImageResolver::resolve`], for callers that already
    /// picked the candidate.
    pub async fn download(&self, url: Option<Url>, key: &str) -> Extraction<ImageRef> {
        let Some(url) = url else {
            debug!("No portrait candidate for {}", key);
            return Extraction::missing(FIELD).with_detail("no candidate image");
        };

        match self.fetch_and_store(&url, key).await {
            Ok(image) => {
                info!("Stored portrait {}", image.path.display());
                Extraction::found(image)
            }
            Err(e) => {
                warn!("Portrait download failed for {} ({}): {}", key, url, e);
                Extraction::missing(FIELD).with_detail(format!("download failed: {}", e))
            }
        }
    }

    async fn fetch_and_store(&self, url: &Url, key: &str) -> Result<ImageRef, ImageError> {
        let image = self.fetch_with_retry(url).await?;
        let stem = match utils::slugify(key) {
            s if s.is_empty() => "prospect".to_string(),
            s => s,
        };
        let path = self.storage_dir.join(format!(
            "{}.{}",
            stem,
            extension_for(image.content_type.as_deref())
        ));

        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| ImageError::Storage(e.to_string()))?;
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| ImageError::Storage(e.to_string()))?;

        Ok(ImageRef {
            url: url.to_string(),
            path,
        })
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<DownloadedImage, ImageError> {
        let attempts = self.retry.attempts();
        let mut last_error = ImageError::Empty;
        for attempt in 1..=attempts {
            let error = match self.source.get(url).await {
                Ok(image) if !image.bytes.is_empty() => return Ok(image),
                Ok(_) => ImageError::Empty,
                Err(e) => e,
            };
            debug!(
                "Image request {} failed (attempt {}/{}): {}",
                url, attempt, attempts, error
            );
            let retryable = is_retryable(&error);
            last_error = error;
            if !retryable {
                break;
            }
            if attempt < attempts {
                self.retry.sleep_after(attempt).await;
            }
        }
        Err(last_error)
    }
}

/// Plain HTTP image download.
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(user_agent: &str) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(HttpImageSource { client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn get(&self, url: &Url) -> Result<DownloadedImage, ImageError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = response.bytes().await?.to_vec();
        Ok(DownloadedImage {
            bytes,
            content_type,
        })
    }
}
