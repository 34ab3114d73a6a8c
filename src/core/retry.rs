use std::future::Future;

use tracing::debug;

use crate::core::config::RetryConfig;
use crate::core::error::LauncherResult;

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. Delays grow by `backoff_multiplier` up to
/// `max_delay`. Cancellation is returned immediately.
pub async fn with_retry<T, F, Fut>(label: &str, config: &RetryConfig, mut op: F) -> LauncherResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LauncherResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_cancellation() => {
                debug!("{}: cancelled", label);
                return Err(e);
            }
            Err(e) => {
                debug!("{}: attempt {} failed: {}", label, attempt, e);
                if !e.is_retryable() || attempt >= max_attempts {
                    return Err(e);
                }
                tokio::time::sleep(delay).await;
                delay = delay
                    .mul_f64(config.backoff_multiplier.max(1.0))
                    .min(config.max_delay());
            }
        }
    }
}
