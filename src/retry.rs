//! Exponential backoff shared by the recognition and dispatch reconnect paths.

use std::time::Duration;

/// Delay before the given reconnect attempt (1-based).
///
/// Doubles per attempt from `base_ms`, capped at `max_ms`. Attempt 1 waits
/// the base delay so an isolated hiccup recovers quickly.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let factor = 1u64 << exp;
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}
