//! Timestamp parsing and normalisation
//!
//! KoboToolbox returns timestamps in several shapes: RFC 3339 with offset, naive
//! ISO 8601 without offset (UTC by convention), or bare dates. Everything is read
//! as UTC and written back as RFC 3339 with a `Z` suffix.

use crate::domain::RawRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Timestamp fields normalised on forms and submissions
pub const DEFAULT_TIMESTAMP_FIELDS: [&str; 5] = [
    "deployment__last_submission_time",
    "date_modified",
    "date_created",
    "date_deployed",
    "_submission_time",
];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp string as UTC
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a JSON value as a timestamp; only strings qualify
pub fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(parse_timestamp)
}

/// Canonical text form of a timestamp
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Rewrite the given timestamp fields of a record in canonical form
///
/// Values that cannot be parsed are left unchanged and logged.
pub fn normalize_timestamps(record: &mut RawRecord, fields: &[String]) {
    for field in fields {
        let Some(value) = record.get_mut(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        match parse_timestamp_value(value) {
            Some(parsed) => *value = Value::String(format_timestamp(&parsed)),
            None => {
                tracing::warn!(
                    field = %field,
                    value = %value,
                    "Failed to parse timestamp, leaving value unchanged"
                );
            }
        }
    }
}
