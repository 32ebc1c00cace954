//! Wall-clock helpers.
//!
//! Frame envelopes and REST payloads carry **milliseconds since Unix epoch**,
//! so every timestamp in the store uses the same unit.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::DateTime;

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Parse a server timestamp into epoch milliseconds.
///
/// Accepts plain integer milliseconds and RFC 3339 with an explicit offset
/// (`2026-01-05T10:00:00+08:00`, `...Z`). A timestamp without an offset is
/// server-local wall time of unknown zone and yields `None`; callers stamp
/// such values with [`now_ms`] instead.
pub fn parse_timestamp_ms(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<u64>() {
        return Some(ms);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok())
}
