//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ExportRetryConfig;

/// Delay before retry `attempt` (1-based; 0 means no delay).
///
/// `base * 2^(attempt-1)`, capped at `max`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, retry: &ExportRetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = retry
        .base_delay_ms
        .saturating_mul(factor)
        .min(retry.max_delay_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
