//! Retry loop for export calls.

use std::future::Future;

use crate::config::ExportRetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Whether a failure is worth another attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Run `op` until it succeeds, fails permanently, or the attempt budget is
/// spent. Returns the last error.
pub async fn retry_transient<T, E, F, Fut>(retry: &ExportRetryConfig, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && e.is_transient() => {
                let delay = calculate_backoff(attempt, retry);
                tracing::debug!(attempt, delay = ?delay, error = %e, "Export failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
