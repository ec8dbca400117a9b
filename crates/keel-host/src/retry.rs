//! Bounded exponential backoff for provisioning API calls

use crate::error::ProvisioningResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry configuration for transient provisioning failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Initial backoff delay (milliseconds)
    pub initial_delay_ms: u64,

    /// Maximum backoff delay (milliseconds)
    pub max_delay_ms: u64,

    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Run `op`, retrying retryable failures up to `max_attempts` in total.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> ProvisioningResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProvisioningResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = %what,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provisioning failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisioningError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_growth_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(config.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(config.delay_for(10), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_at_most_three_times() {
        let calls = AtomicU32::new(0);
        let result: ProvisioningResult<()> = RetryConfig::default()
            .run("describe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProvisioningError::Transient("connection reset".into()))
            })
            .await;

        assert!(matches!(result, Err(ProvisioningError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ProvisioningResult<()> = RetryConfig::default()
            .run("create", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProvisioningError::Quota("CPUS".into()))
            })
            .await;

        assert!(matches!(result, Err(ProvisioningError::Quota(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient() {
        let calls = AtomicU32::new(0);
        let result = RetryConfig::default()
            .run("describe", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProvisioningError::Transient("503".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
