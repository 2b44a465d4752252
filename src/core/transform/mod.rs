//! Record transformation
//!
//! - [`timestamps`] normalises timestamp fields to RFC 3339 UTC
//! - [`eav`] reshapes submissions into metadata plus question/response pairs
//! - [`tabular`] turns downloaded CSV files into records

pub mod eav;
pub mod tabular;
pub mod timestamps;

pub use eav::{EavTransformer, DEFAULT_EXCLUDED_FIELDS};
pub use tabular::{parse_csv, ROW_FIELD};
pub use timestamps::{
    format_timestamp, normalize_timestamps, parse_timestamp, parse_timestamp_value,
    DEFAULT_TIMESTAMP_FIELDS,
};

use crate::domain::{RawRecord, RecordBody, RecordShape};

/// Shape a raw record for loading according to its resource
pub fn reshape(shape: RecordShape, record: RawRecord, eav: &EavTransformer) -> RecordBody {
    match shape {
        RecordShape::Raw => RecordBody::Raw(record),
        RecordShape::Eav => RecordBody::Flat(eav.transform(&record)),
    }
}
