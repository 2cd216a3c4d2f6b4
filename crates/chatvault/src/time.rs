//! Time utilities for Chatvault.
//!
//! Journal timestamps are UTC with second precision, written as
//! `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Current UTC time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

/// Current time as an ISO-8601 string (`2024-05-01T12:00:00Z`).
pub fn now_iso() -> String {
    to_iso(&now())
}

pub fn to_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 timestamp. Offsets are converted to UTC; a naive
/// timestamp is taken as UTC.
pub fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Seconds since the Unix epoch.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}
