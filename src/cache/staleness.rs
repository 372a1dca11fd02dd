//! Freshness rule for cached resources

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Age in hours at which a cached entry stops being served without a refresh
pub const CACHE_MAX_AGE_HOURS: i64 = 12;

/// Maximum age of a fresh cache entry
pub fn max_age() -> Duration {
    Duration::hours(CACHE_MAX_AGE_HOURS)
}

/// Whether an entry synced at `last_synced_at` needs a refresh right now
pub fn is_stale(last_synced_at: Option<&str>) -> bool {
    is_stale_at(last_synced_at, Utc::now().naive_utc())
}

/// Whether an entry synced at `last_synced_at` needs a refresh at `now`
///
/// Absent or unparsable timestamps are always stale. All times are naive UTC.
pub fn is_stale_at(last_synced_at: Option<&str>, now: NaiveDateTime) -> bool {
    match last_synced_at.and_then(parse_timestamp) {
        Some(synced_at) => now - synced_at >= max_age(),
        None => true,
    }
}

/// Parses an ISO-8601 timestamp into naive UTC
///
/// Offset-carrying timestamps are converted to UTC; naive ones are taken as-is.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp);
        }
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.naive_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
