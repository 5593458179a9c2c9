//! Retry policy for failed salons.
//!
//! Transient failures are retried in-line with exponential backoff. The same
//! cap bounds operator-triggered retries of recorded failures.

use super::models::FailureKind;
use crate::config::EnrichmentSettings;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed before a salon needs a forced retry.
    pub max_retries: u32,
    /// Whether transient failures are retried before being recorded.
    pub auto_retry_transient: bool,
    pub initial_backoff_ms: u64,
    /// Cap for exponential growth.
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &EnrichmentSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            auto_retry_transient: settings.auto_retry_transient,
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Whether a failure should be retried in-line right away.
    pub fn should_auto_retry(&self, kind: FailureKind, retries: u32) -> bool {
        self.auto_retry_transient && kind.is_transient() && retries < self.max_retries
    }

    /// Whether `retry_failed` may requeue a recorded failure.
    pub fn can_requeue(&self, kind: FailureKind, retries: u32) -> bool {
        !kind.is_permanent() && retries < self.max_retries
    }

    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let backoff =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry_count as i32);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            auto_retry_transient: true,
            initial_backoff_ms: 2000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}
