//! Entity-attribute-value reshaping of survey submissions
//!
//! Survey forms differ in their questions, so a submission cannot be mapped to a
//! fixed set of columns. The transform keeps `_`-prefixed metadata fields as they
//! are and turns every other field into a `(question, response)` entry, in the
//! order the fields appeared in the submission.

use crate::domain::{FlatRecord, RawRecord, ResponseEntry, ResponseValue};
use std::collections::HashSet;

/// Fields dropped from submissions before reshaping
pub const DEFAULT_EXCLUDED_FIELDS: [&str; 3] = ["_geolocation", "_downloads", "_validation_status"];

/// Prefix marking a metadata field
pub const METADATA_PREFIX: char = '_';

/// Reshapes raw submissions into [`FlatRecord`]s
///
/// The transform is total: every input produces an output, and every field that
/// is neither excluded nor metadata ends up in exactly one response entry.
#[derive(Debug, Clone)]
pub struct EavTransformer {
    excluded: HashSet<String>,
}

impl Default for EavTransformer {
    fn default() -> Self {
        Self::with_excluded(DEFAULT_EXCLUDED_FIELDS)
    }
}

impl EavTransformer {
    /// Transformer dropping the given fields instead of the defaults
    pub fn with_excluded<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded(&self, field: &str) -> bool {
        self.excluded.contains(field)
    }

    /// Reshape one submission
    pub fn transform(&self, record: &RawRecord) -> FlatRecord {
        let mut metadata = RawRecord::new();
        let mut responses = Vec::new();

        for (key, value) in record {
            if self.is_excluded(key) {
                continue;
            }

            if key.starts_with(METADATA_PREFIX) {
                metadata.insert(key.clone(), value.clone());
            } else {
                responses.push(ResponseEntry {
                    question: key.clone(),
                    response: ResponseValue::from_json(value),
                });
            }
        }

        FlatRecord {
            metadata,
            responses,
        }
    }
}
