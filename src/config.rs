//! Configuration value objects handed to the pipeline at construction time.

use crate::retry::{PacingWindow, RetryPolicy};
use crate::CrawlerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://www.nfldraftbuzz.com";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Relative identifiers are joined onto this.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub images: ImageConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        ScraperConfig {
            base_url: default_base_url(),
            session: SessionConfig::default(),
            images: ImageConfig::default(),
        }
    }
}

impl ScraperConfig {
    pub fn from_file(path: &Path) -> Result<Self, CrawlerError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default)]
    pub viewport: Viewport,

    #[serde(default)]
    pub user_agent: Option<String>,

    /// Chrome/Chromium binary. Detected from well-known locations when unset.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Ceiling for the initial page load of one attempt.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    #[serde(default)]
    pub settle: SettleConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub pacing: PacingWindow,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            headless: default_headless(),
            viewport: Viewport::default(),
            user_agent: None,
            chrome_executable: None,
            navigation_timeout_ms: default_navigation_timeout_ms(),
            settle: SettleConfig::default(),
            retry: RetryPolicy::default(),
            pacing: PacingWindow::default(),
        }
    }
}

impl SessionConfig {
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1920,
            height: 1080,
        }
    }
}

/// A page is settled once the DOM stops mutating for `quiet_ms`,
/// or after `max_wait_ms`, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub quiet_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        SettleConfig {
            quiet_ms: 1000,
            max_wait_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            enabled: default_enabled(),
            storage_dir: default_storage_dir(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_headless() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

fn default_navigation_timeout_ms() -> u64 {
    60_000
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("player_photos")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ScraperConfig = serde_json::from_str(
            r#"{
                "session": {
                    "headless": false,
                    "retry": { "max_attempts": 5 },
                    "pacing": { "enabled": false }
                },
                "images": { "storage_dir": "/tmp/photos" }
            }"#,
        )
        .expect("Invalid config");

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(!config.session.headless);
        assert_eq!(config.session.viewport, Viewport::default());
        assert_eq!(config.session.retry.max_attempts, 5);
        assert_eq!(
            config.session.retry.base_delay_ms,
            RetryPolicy::default().base_delay_ms
        );
        assert!(!config.session.pacing.enabled);
        assert_eq!(config.images.storage_dir, PathBuf::from("/tmp/photos"));
        assert!(config.images.enabled);
        assert_eq!(config.session.user_agent(), DEFAULT_USER_AGENT);
    }
}
