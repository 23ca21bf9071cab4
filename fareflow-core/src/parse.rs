//! Lenient field parsing shared by the collector and the cleaner.
//!
//! Upstream payloads and raw partitions are loosely typed: dates show up as
//! RFC 3339 timestamps, naive timestamps or plain dates, and numeric fields
//! arrive as JSON numbers or strings. Every parser here returns `None` on
//! anything it cannot interpret; none of them fail.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Parse a calendar date from a date or timestamp string.
///
/// Accepts `2026-02-01`, `2026-02-01T10:00:00`, `2026-02-01T10:00:00Z` and
/// `2026-02-01T10:00:00-05:00`. Timestamps with an offset keep the date as
/// written in that offset. As a last resort the first ten characters are
/// tried as a plain date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }

    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Parse a finite float from a string. Blank, non-numeric, NaN and infinite
/// values are treated as missing.
pub fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer from a string, accepting integral floats such as `"2.0"`.
pub fn parse_i64(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    parse_f64(raw).filter(|v| v.fract() == 0.0).map(|v| v as i64)
}

/// Price from a JSON value: a number or a numeric string.
pub fn price_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_f64(s),
        _ => None,
    }
}

/// Integer from a JSON value: an integer, an integral float, or a numeric string.
pub fn int_from_json(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
        Value::String(s) => parse_i64(s),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Text from a JSON scalar. `null`, blank strings and nested values are missing.
pub fn text_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
