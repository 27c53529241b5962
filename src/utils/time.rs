//! Wall-clock helpers.
//!
//! Absolute timer deadlines are expressed in milliseconds since the Unix epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Returns 0 if the system clock reads earlier than the epoch.
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Time left until `deadline_ms`, or zero if it already passed.
pub fn until_timestamp_millis(deadline_ms: u64) -> Duration {
    Duration::from_millis(deadline_ms.saturating_sub(current_timestamp_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_deadline_is_zero() {
        assert_eq!(until_timestamp_millis(0), Duration::ZERO);
    }

    #[test]
    fn test_future_deadline() {
        let left = until_timestamp_millis(current_timestamp_millis() + 60_000);
        assert!(left > Duration::from_secs(50));
        assert!(left <= Duration::from_secs(60));
    }
}
