use anyhow::Result;
use common::upstream::classify_anyhow_api_error;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Zero disables sleeping between attempts.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &common::config::Retry) -> Self {
        Self {
            max_retries: cfg.max_retries,
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential delay before retry `n` (1-based).
    fn delay(&self, n: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(n.saturating_sub(1)))
    }
}

/// Run `op` until it succeeds or the budget runs out, returning the last error.
/// Configuration errors (e.g. no API key) are returned immediately.
pub async fn with_retry<T, F, Fut>(
    source: &'static str,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 0..policy.attempts() {
        if attempt > 0 {
            metrics::counter!("profiler_source_retries_total", "source" => source).increment(1);
            let delay = policy.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !classify_anyhow_api_error(&e).is_retryable() {
                    return Err(e);
                }
                let remaining = policy.max_retries - attempt;
                warn!(source, attempt = attempt + 1, remaining, error = %e, "source call failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{source}: no attempts made")))
}

/// Collapse a failed source into its degraded default.
pub fn degrade<T>(
    source: &'static str,
    res: Result<T>,
    default: impl FnOnce(&anyhow::Error) -> T,
) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            warn!(source, error = %e, "source exhausted; using degraded default");
            metrics::counter!("profiler_source_degraded_total", "source" => source).increment(1);
            default(&e)
        }
    }
}
