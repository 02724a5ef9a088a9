//! Lenient field extraction from partner JSON records.
//!
//! Partner payloads are not strictly schema'd; numeric fields arrive as
//! numbers or strings depending on endpoint version, and some field names
//! have aliases. Extraction tries each alias in order.

use chrono::NaiveDateTime;
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::processors::WINDOW_FORMAT;

/// First non-empty string value among the aliased field names.
pub(crate) fn str_field(record: &serde_json::Value, names: &[&str]) -> Option<String> {
    for name in names {
        match record.get(name) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                return Some(s.trim().to_string());
            }
            Some(serde_json::Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First numeric value among the aliased field names; string-encoded numbers
/// are accepted.
pub(crate) fn f64_field(record: &serde_json::Value, names: &[&str]) -> Option<f64> {
    for name in names {
        match record.get(name) {
            Some(serde_json::Value::Number(n)) => return n.as_f64(),
            Some(serde_json::Value::String(s)) => {
                if let Ok(parsed) = s.trim().parse::<f64>() {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

/// First parseable "YYYY-MM-DD HH:MM:SS" timestamp among the aliased names,
/// interpreted as UTC.
pub(crate) fn datetime_field(
    record: &serde_json::Value,
    names: &[&str],
) -> Option<DateTimeWithTimeZone> {
    let raw = str_field(record, names)?;
    let naive = NaiveDateTime::parse_from_str(&raw, WINDOW_FORMAT).ok()?;
    Some(naive.and_utc().fixed_offset())
}
