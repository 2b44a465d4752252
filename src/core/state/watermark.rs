//! Watermark model for tracking incremental sync state
//!
//! A watermark is the largest cursor value that has been durably loaded for a
//! `{pipeline, resource, cursor_field, partition}` combination. The partition is
//! the parent's primary key for per-parent child cursors and empty otherwise.

use crate::domain::MissingPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a watermark
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatermarkKey {
    pub pipeline_name: String,
    pub resource_name: String,
    pub cursor_field: String,
    /// Parent primary key, or empty for a resource-wide watermark
    pub partition: String,
}

impl WatermarkKey {
    pub fn new(
        pipeline_name: impl Into<String>,
        resource_name: impl Into<String>,
        cursor_field: impl Into<String>,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            resource_name: resource_name.into(),
            cursor_field: cursor_field.into(),
            partition: partition.into(),
        }
    }

    /// Generate the storage ID for a watermark
    ///
    /// Format: "{pipeline}:{resource}:{cursor_field}" with ":{partition}" appended
    /// when the watermark is partitioned.
    pub fn generate_id(&self) -> String {
        if self.partition.is_empty() {
            format!(
                "{}:{}:{}",
                self.pipeline_name, self.resource_name, self.cursor_field
            )
        } else {
            format!(
                "{}:{}:{}:{}",
                self.pipeline_name, self.resource_name, self.cursor_field, self.partition
            )
        }
    }
}

/// Committed watermark
///
/// # Examples
///
/// ```
/// use harvest::core::state::watermark::{WatermarkBuilder, WatermarkKey};
/// use chrono::{TimeZone, Utc};
///
/// let key = WatermarkKey::new("harvest", "kobo_submission", "_submission_time", "aBc123");
/// let value = Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 1).unwrap();
///
/// let watermark = WatermarkBuilder::new(key, value).build();
///
/// assert_eq!(watermark.id, "harvest:kobo_submission:_submission_time:aBc123");
/// assert_eq!(watermark.value, value);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Storage identifier, see [`WatermarkKey::generate_id`]
    pub id: String,

    pub pipeline_name: String,

    pub resource_name: String,

    pub cursor_field: String,

    pub partition: String,

    /// Largest cursor value loaded so far
    pub value: DateTime<Utc>,

    /// Policy in force when the watermark was written
    pub missing_policy: MissingPolicy,

    /// Run that last advanced this watermark
    pub last_load_id: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl Watermark {
    pub fn key(&self) -> WatermarkKey {
        WatermarkKey::new(
            self.pipeline_name.clone(),
            self.resource_name.clone(),
            self.cursor_field.clone(),
            self.partition.clone(),
        )
    }
}

/// Builder for creating Watermark instances
pub struct WatermarkBuilder {
    key: WatermarkKey,
    value: DateTime<Utc>,
    missing_policy: MissingPolicy,
    last_load_id: Option<String>,
}

impl WatermarkBuilder {
    pub fn new(key: WatermarkKey, value: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            missing_policy: MissingPolicy::Include,
            last_load_id: None,
        }
    }

    pub fn missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing_policy = policy;
        self
    }

    pub fn last_load_id(mut self, load_id: impl Into<String>) -> Self {
        self.last_load_id = Some(load_id.into());
        self
    }

    pub fn build(self) -> Watermark {
        Watermark {
            id: self.key.generate_id(),
            pipeline_name: self.key.pipeline_name,
            resource_name: self.key.resource_name,
            cursor_field: self.key.cursor_field,
            partition: self.key.partition,
            value: self.value,
            missing_policy: self.missing_policy,
            last_load_id: self.last_load_id,
            updated_at: Utc::now(),
        }
    }
}
