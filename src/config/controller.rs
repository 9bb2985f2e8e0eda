//! Controller and retry configuration.

use std::time::Duration;

use serde::Deserialize;

/// Reconciliation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Namespace to watch. Unset watches all namespaces.
    pub namespace: Option<String>,
    /// Prepare TTL applied to topologies that leave it unset.
    pub default_prepare_ttl_minutes: u32,
    /// Delay between checks while waiting for dependent clusters.
    pub dependency_wait_secs: u64,
    /// Delay before re-reading a topology after a state-changing write.
    pub requeue_after_write_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            default_prepare_ttl_minutes: 30,
            dependency_wait_secs: 5,
            requeue_after_write_ms: 500,
        }
    }
}

impl ControllerConfig {
    pub fn dependency_wait(&self) -> Duration {
        Duration::from_secs(self.dependency_wait_secs)
    }

    pub fn requeue_after_write(&self) -> Duration {
        Duration::from_millis(self.requeue_after_write_ms)
    }
}

/// Backoff for requeueing failed passes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive failures before a topology waits for its next change.
    pub max_retries: u32,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            max_retries: 10,
            jitter: 0.25,
        }
    }
}
