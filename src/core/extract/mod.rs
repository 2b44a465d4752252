//! Resource extraction
//!
//! [`ResourceExtractor`] drives a paginator for one resource and parent,
//! pushing the watermark to the server through [`query::cursor_params`] and
//! re-checking it client-side.

pub mod extractor;
pub mod query;

pub use extractor::{Extraction, ExtractionStats, ResourceExtractor};
pub use query::cursor_params;
