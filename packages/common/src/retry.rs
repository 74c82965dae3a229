use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// How often and how patiently a fallible remote call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u8,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl RetryPolicy {
    /// Pause before the `retry`-th retry: `base_ms * 2^(retry-1)` plus up to
    /// 25% jitter, never above `max_ms`.
    pub fn delay(&self, retry: u8) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exp_factor = 2u64.saturating_pow((retry - 1) as u32);
        let delay_ms = self.base_ms.saturating_mul(exp_factor);

        let jitter = if delay_ms > 0 {
            rand::rng().random_range(0..=delay_ms / 4)
        } else {
            0
        };

        Duration::from_millis(delay_ms.saturating_add(jitter).min(self.max_ms))
    }
}

/// Run `op` until it succeeds, the policy is exhausted, or `is_permanent`
/// classifies the error as not worth retrying.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    is_permanent: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u8 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_permanent(&err) || attempt >= policy.max_retries => return Err(err),
            Err(err) => {
                attempt += 1;
                let delay = policy.delay(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Remote call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
