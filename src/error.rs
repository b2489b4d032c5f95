use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Database error")]
    DatabaseError(#[from] sqlx::error::Error),
    #[error("Serialization error")]
    JsonError(#[from] serde_json::Error),
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
    #[error("Invalid url")]
    UrlError(#[from] url::ParseError),
    #[error("Browser session could not be opened: {0}")]
    SessionError(#[from] BrowserError),
}

/// Failure of a single browser operation. Retryable by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrowserError {
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("network error: {message}")]
    Network { message: String },
    #[error("challenge or block page detected ({marker})")]
    Challenge { marker: String },
    #[error("browser error: {message}")]
    Browser { message: String },
}

impl BrowserError {
    pub fn browser(message: impl fmt::Display) -> Self {
        BrowserError::Browser {
            message: message.to_string(),
        }
    }

    pub fn network(message: impl fmt::Display) -> Self {
        BrowserError::Network {
            message: message.to_string(),
        }
    }

    /// The browser process or its connection is gone, not just the page.
    pub fn needs_relaunch(&self) -> bool {
        match self {
            BrowserError::Browser { message } => {
                let message = message.to_lowercase();
                [
                    "target closed",
                    "browser has been closed",
                    "browser is not running",
                    "connection closed",
                    "channel closed",
                ]
                .iter()
                .any(|m| message.contains(m))
            }
            _ => false,
        }
    }
}

/// Every attempt for one navigation was used up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("navigation to {url} failed after {attempts} attempt(s): {cause}")]
pub struct NavigationFailed {
    pub url: String,
    pub attempts: u32,
    pub cause: BrowserError,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Navigation(#[from] NavigationFailed),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("empty response body")]
    Empty,
    #[error("could not store image: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ImageError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ImageError::Status(status.as_u16()),
            None => ImageError::Request(e.to_string()),
        }
    }
}

/// Why one identifier produced no prospect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    #[error("{0}")]
    NavigationFailed(NavigationFailed),
    #[error("page contained no extractable content")]
    NoContent,
    #[error("cannot build a url from identifier: {reason}")]
    InvalidTarget { reason: String },
    #[error("no browser session to fetch with: {cause}")]
    SessionUnavailable { cause: BrowserError },
    #[error("saved page could not be read: {reason}")]
    Unreadable { reason: String },
}

/// Terminal failure for one identifier. Never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{identifier}: {kind}")]
pub struct ExtractionError {
    pub identifier: String,
    pub url: Option<String>,
    pub kind: FailureKind,
}

impl ExtractionError {
    pub fn is_navigation_failure(&self) -> bool {
        matches!(self.kind, FailureKind::NavigationFailed(_))
    }
}
