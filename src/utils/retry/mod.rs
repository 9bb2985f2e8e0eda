//! Retry utilities with exponential backoff, cap, and jitter.
//!
//! `RetryConfig` drives the controller's error policy: each consecutive
//! failed pass of a topology is requeued a little later, until the retry
//! budget is spent. `connection_backoff` is used for API server connection
//! at startup.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::RetrySettings;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay for first retry (before jitter).
    pub base_delay: Duration,
    /// Maximum delay cap (before jitter).
    pub max_delay: Duration,
    /// Maximum number of retry attempts (0 = no retries, just initial attempt).
    pub max_retries: u32,
    /// Jitter factor: delay is multiplied by random value in [1-jitter, 1+jitter].
    /// Set to 0.0 for no jitter.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_retries: settings.max_retries,
            jitter: settings.jitter.clamp(0.0, 1.0),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: delay = base * 2^attempt, capped at max_delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exponential_ms = base_ms.saturating_mul(1u64 << attempt.min(20));

        let capped_ms = exponential_ms.min(self.max_delay.as_millis() as u64);

        let jittered_ms = if self.jitter > 0.0 {
            let factor = 1.0 + rand::random_range(-self.jitter..=self.jitter);
            (capped_ms as f64 * factor) as u64
        } else {
            capped_ms
        };

        Duration::from_millis(jittered_ms)
    }

    /// Check if another retry attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Backoff for API server connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}
