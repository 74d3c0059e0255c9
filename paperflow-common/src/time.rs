//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Calendar-day stamp used in journal file names (`YYYYMMDD`)
pub fn day_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}

/// Second-resolution stamp used for backup file suffixes (`YYYYmmdd_HHMMSS`)
pub fn backup_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Fractional days elapsed between two instants (negative spans clamp to 0)
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let secs = (later - earlier).num_seconds().max(0) as f64;
    secs / 86_400.0
}
