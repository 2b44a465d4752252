//! Domain models and types for Harvest.
//!
//! The domain layer provides:
//! - **Records** ([`RawRecord`], [`FlatRecord`], [`ResponseValue`])
//! - **Resource definitions** ([`ResourceSpec`], [`CursorSpec`])
//! - **Error types** ([`HarvestError`], [`KoboError`])
//! - **Result type alias** ([`Result`])
//!
//! # Building a resource
//!
//! ```rust
//! use harvest::domain::{CursorSpec, MissingPolicy, ResourceSource, ResourceSpec};
//! use chrono::{TimeZone, Utc};
//!
//! # fn example() -> harvest::domain::Result<()> {
//! let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
//! let spec = ResourceSpec::builder(
//!     "kobo_submission",
//!     ResourceSource::Endpoint {
//!         path: "/api/v2/assets/{uid}/data/".to_string(),
//!         params: vec![],
//!     },
//! )
//! .primary_key(["_id", "_uuid"])
//! .cursor(CursorSpec::new("_submission_time", start).missing_policy(MissingPolicy::Raise))
//! .build()?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod record;
pub mod resource;
pub mod result;

pub use errors::{HarvestError, KoboError};
pub use record::{FlatRecord, RawRecord, RecordBody, ResponseEntry, ResponseValue};
pub use resource::{
    CursorFilter, CursorScope, CursorSpec, JoinField, MissingPolicy, RecordFilter, RecordShape,
    ResourceSource, ResourceSpec, ResourceSpecBuilder, WriteDisposition, DEFAULT_CURSOR_FORMAT,
};
pub use result::Result;
