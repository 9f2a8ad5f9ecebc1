//! Drain scheduling constants and helpers.

use rand::Rng;
use std::time::Duration;

/// Poll cadence while items are pending but none are due yet.
pub const DRAIN_PENDING_POLL_SECS: u64 = 10;

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(consecutive_failures: i32) -> i64 {
    const MAX_EXPONENT: i32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = i64::from(consecutive_failures.clamp(0, MAX_EXPONENT));
    2_i64.pow(capped as u32) * BASE_DELAY_SECONDS
}

/// Delay before the next background drain pass.
pub fn next_drain_delay(has_pending: bool, poll_interval_secs: u64, jitter_secs: u64) -> Duration {
    let base = if has_pending {
        poll_interval_secs.min(DRAIN_PENDING_POLL_SECS)
    } else {
        poll_interval_secs
    };
    let jitter = if jitter_secs == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_secs)
    };
    Duration::from_secs(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_seconds(0), 5);
        assert_eq!(backoff_seconds(1), 10);
        assert_eq!(backoff_seconds(2), 20);
        assert_eq!(backoff_seconds(9), backoff_seconds(8));
        assert_eq!(backoff_seconds(-3), 5);
    }

    #[test]
    fn pending_items_shorten_the_poll() {
        assert_eq!(next_drain_delay(true, 45, 0), Duration::from_secs(10));
        assert_eq!(next_drain_delay(false, 45, 0), Duration::from_secs(45));
        let jittered = next_drain_delay(false, 45, 5);
        assert!(jittered >= Duration::from_secs(45) && jittered <= Duration::from_secs(50));
    }
}
