//! Reconnect backoff schedule.

use std::time::Duration;

/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1000;
/// Ceiling for the reconnect delay.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Delay before reconnect attempt `attempt` (0-based).
///
/// Doubles from one second per failed attempt and saturates at one
/// minute: 1s, 2s, 4s, ... 60s. The shift is clamped so very large
/// attempt counters cannot overflow.
#[must_use]
pub fn reconnect_delay(attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(31);
    let delay_ms = BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_one_second() {
        assert_eq!(reconnect_delay(0), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(1), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(2), Duration::from_millis(4000));
        assert_eq!(reconnect_delay(3), Duration::from_millis(8000));
        assert_eq!(reconnect_delay(4), Duration::from_millis(16_000));
        assert_eq!(reconnect_delay(5), Duration::from_millis(32_000));
    }

    #[test]
    fn caps_at_sixty_seconds() {
        assert_eq!(reconnect_delay(6), Duration::from_millis(60_000));
        assert_eq!(reconnect_delay(7), Duration::from_millis(60_000));
        assert_eq!(reconnect_delay(100), Duration::from_millis(60_000));
    }

    #[test]
    fn never_exceeds_cap_or_overflows() {
        for attempt in 0..=u32::MAX.min(10_000) {
            let delay = reconnect_delay(attempt);
            assert!(delay >= Duration::from_millis(BASE_DELAY_MS));
            assert!(delay <= Duration::from_millis(MAX_DELAY_MS));
        }
        let _ = reconnect_delay(u32::MAX);
    }
}
