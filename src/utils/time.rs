//! Time and timestamp utilities

use chrono::{DateTime, FixedOffset, Utc};

/// Timestamp format of range-query parameters, e.g. `2024-02-17T20:13:25+0100`
pub const REQUEST_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Get current Unix timestamp in seconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Parse a request timestamp
///
/// Accepts [`REQUEST_TIME_FORMAT`] and falls back to RFC 3339. A space where
/// the offset sign should be is read as `+`, since an unescaped `+` in a query
/// string decodes to a space.
pub fn parse_request_time(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim().replace(' ', "+");

    DateTime::<FixedOffset>::parse_from_str(&text, REQUEST_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(&text))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
