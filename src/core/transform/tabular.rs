//! CSV files as records
//!
//! Each line of a CSV file with a header row becomes one record keyed by the
//! header names, plus its 1-based line number in [`ROW_FIELD`]. Cells are
//! typed the way a spreadsheet reader would: empty cells become null, and
//! integers, decimals and booleans become JSON numbers and booleans.

use crate::domain::{HarvestError, RawRecord, Result};
use serde_json::{Number, Value};

/// Field holding the line number of a parsed row
pub const ROW_FIELD: &str = "_row";

/// Parse a whole CSV file
///
/// # Errors
///
/// Returns `Transform` if the file is not valid UTF-8 CSV or a line has a
/// different number of cells than the header. Nothing is returned for a
/// file that fails part-way.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| HarvestError::Transform(format!("Invalid CSV header: {e}")))?
        .clone();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| HarvestError::Transform(format!("Invalid CSV line: {e}")))?;

        let mut record = RawRecord::new();
        record.insert(ROW_FIELD.to_string(), Value::from(index as u64 + 1));
        for (header, cell) in headers.iter().zip(row.iter()) {
            record.insert(header.to_string(), typed_cell(cell));
        }
        records.push(record);
    }

    Ok(records)
}

fn typed_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(integer) = cell.parse::<i64>() {
        return Value::from(integer);
    }
    if let Some(number) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}
