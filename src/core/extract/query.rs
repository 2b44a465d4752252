//! Server-side cursor filters

use crate::domain::CursorFilter;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Query parameters asking the server for records with `field >= value`
///
/// The value is rendered with `format`; a coarser format truncates the value
/// and so only widens the range.
pub fn cursor_params(
    filter: &CursorFilter,
    field: &str,
    value: &DateTime<Utc>,
    format: &str,
) -> Vec<(String, String)> {
    let formatted = value.format(format).to_string();

    match filter {
        CursorFilter::None => Vec::new(),
        CursorFilter::QueryRange { param } => {
            vec![(param.clone(), format!("{field}__gte:{formatted}"))]
        }
        CursorFilter::JsonDocument { param } => {
            let mut bound = Map::new();
            bound.insert("$gte".to_string(), Value::String(formatted));
            let mut document = Map::new();
            document.insert(field.to_string(), Value::Object(bound));
            vec![(param.clone(), Value::Object(document).to_string())]
        }
    }
}
