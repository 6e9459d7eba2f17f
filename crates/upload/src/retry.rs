//! Bounded retry with exponential backoff for idempotent storage calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::UploadError;

/// How often, and how patiently, a failed request is repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retrying.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based), with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let base = self.initial_delay_ms as f64 / 1000.0 * self.backoff_factor.powi(exp);
        let capped = base.min(self.max_delay_ms as f64 / 1000.0);
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, UploadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
