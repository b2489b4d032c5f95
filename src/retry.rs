//! Retry and pacing discipline shared by page navigation and image downloads.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random delay added to every backoff.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            jitter_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the `failed_attempt`-th failure (1-based).
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms.max(self.base_delay_ms));
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(exponential + jitter)
    }

    pub async fn sleep_after(&self, failed_attempt: u32) {
        let delay = self.backoff(failed_attempt);
        if !delay.is_zero() {
            debug!("Backing off for {:?} after attempt {}", delay, failed_attempt);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Randomized pause inserted between successful requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingWindow {
    pub enabled: bool,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for PacingWindow {
    fn default() -> Self {
        PacingWindow {
            enabled: true,
            min_ms: 3_500,
            max_ms: 4_500,
        }
    }
}

impl PacingWindow {
    pub fn disabled() -> Self {
        PacingWindow {
            enabled: false,
            min_ms: 0,
            max_ms: 0,
        }
    }

    pub fn sample(&self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let millis = if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(millis)
    }
}

#[derive(Debug)]
pub struct Pacer {
    window: PacingWindow,
    last_success: Option<Instant>,
}

impl Pacer {
    pub fn new(window: PacingWindow) -> Self {
        Pacer {
            window,
            last_success: None,
        }
    }

    /// Sleeps out whatever is left of a freshly sampled delay since the last success.
    pub async fn wait(&self) {
        let Some(last_success) = self.last_success else {
            return;
        };
        let delay = self.window.sample();
        let elapsed = Instant::now().duration_since(last_success);
        if elapsed < delay {
            debug!("Pacing for {:?}", delay - elapsed);
            tokio::time::sleep(delay - elapsed).await;
        }
    }

    pub fn mark_success(&mut self) {
        self.last_success = Some(Instant::now());
    }
}
