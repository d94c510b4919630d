//! Time utilities shared by the rate store and the server.

use chrono::{DateTime, TimeZone, Utc};

/// Default interval between upstream rate refreshes (1 hour).
pub const DEFAULT_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Convert unix seconds, as reported by upstream rate feeds, into a timestamp.
///
/// Out-of-range values map to `None`.
pub fn from_unix_seconds(seconds: i64) -> Option<Timestamp> {
    Utc.timestamp_opt(seconds, 0).single()
}

/// Check whether more than `interval` has elapsed since `since`.
///
/// A timestamp in the future is never considered elapsed.
pub fn has_elapsed(since: Timestamp, interval: std::time::Duration) -> bool {
    let age = now().signed_duration_since(since);
    match age.to_std() {
        Ok(age) => age > interval,
        Err(_) => false,
    }
}
