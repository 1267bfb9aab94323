//! Exponential backoff schedule.

use std::time::Duration;

/// Delay to wait after failure number `failure` (1-indexed) before the next attempt.
///
/// The schedule is `base * 2^(failure - 1)`: no jitter and no cap. Overflow
/// saturates instead of wrapping.
pub fn calculate_backoff(failure: u32, base: Duration) -> Duration {
    if failure == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(failure - 1);
    base.checked_mul(factor).unwrap_or(Duration::MAX)
}
