//! Time utilities for ledger records.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Linear backoff before commit attempt `attempt` (1-based), plus `jitter`.
pub fn retry_delay(base: Duration, attempt: u32, jitter: Duration) -> Duration {
    base.saturating_mul(attempt.max(1)) + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_grows_linearly() {
        let base = Duration::from_millis(5);
        assert_eq!(retry_delay(base, 1, Duration::ZERO), Duration::from_millis(5));
        assert_eq!(retry_delay(base, 3, Duration::from_millis(2)), Duration::from_millis(17));
        assert_eq!(retry_delay(base, 0, Duration::ZERO), Duration::from_millis(5));
    }
}
