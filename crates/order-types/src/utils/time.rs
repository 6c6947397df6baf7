//! Clock helpers for timestamps and store expiry markers.

use chrono::{DateTime, Duration, Utc};

/// Returns the current wall-clock time in UTC.
pub fn current_timestamp() -> DateTime<Utc> {
	Utc::now()
}

/// Returns the Unix-seconds expiry marker `horizon` from `now`.
///
/// Stores use this value for garbage collection of stale records.
pub fn expiry_timestamp(now: DateTime<Utc>, horizon: Duration) -> i64 {
	(now + horizon).timestamp()
}
