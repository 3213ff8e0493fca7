//! Exponential backoff for upstream calls.
//!
//! Only failures that carry a transient
//! [`UpstreamError`](rfp_harness_core::error::UpstreamError) (rate limiting,
//! outages, network errors) are retried. Anything else fails immediately.
//! Delays double from `base_delay` and are capped at `base_delay * 32`.

use anyhow::Result;
use rfp_harness_core::error::is_transient;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(5);
        self.base_delay * (1u32 << exp)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn with_backoff<T, F, Fut>(policy: BackoffPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_transient(&err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    target: "rfp::retry",
                    "{} failed (attempt {}/{}), retrying in {:?}: {:#}",
                    label, attempt, policy.max_attempts, delay, err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
