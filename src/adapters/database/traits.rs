//! Destination abstraction traits
//!
//! This module defines the traits that destination adapters must implement
//! to work with Harvest.

use crate::core::cascade::summary::RunTrace;
use crate::core::state::watermark::{Watermark, WatermarkKey};
use crate::domain::{RecordBody, Result, WriteDisposition};
use async_trait::async_trait;

/// One row headed for the destination
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    /// JSON array of the primary key values
    pub key: String,

    pub body: RecordBody,
}

/// Rows of one resource plus the watermark updates they justify
///
/// A sink must persist both in a single transaction: either the rows and the
/// watermarks are stored, or neither is.
#[derive(Debug, Clone)]
pub struct LoadBatch {
    /// Identifier of the run the batch belongs to
    pub load_id: String,

    pub resource: String,

    pub table: String,

    pub primary_key: Vec<String>,

    pub disposition: WriteDisposition,

    pub records: Vec<LoadRecord>,

    pub watermarks: Vec<Watermark>,
}

impl LoadBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.watermarks.is_empty()
    }
}

/// Confirmation of a durable write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHandle {
    pub table: String,

    /// Rows inserted or updated
    pub rows_written: usize,

    pub watermarks_committed: usize,
}

/// Storage sink trait for loaded records
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Test the destination connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Create the bookkeeping schema if it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    async fn ensure_schema(&self) -> Result<()>;

    /// Persist a batch and its watermark updates atomically
    ///
    /// `merge` replaces rows with the same key, `append` always inserts, and
    /// `replace` empties the table once per load before inserting.
    ///
    /// # Errors
    ///
    /// Returns `Sink` if nothing was persisted.
    async fn write(&self, batch: LoadBatch) -> Result<CommitHandle>;

    /// Record the outcome of a run
    ///
    /// # Errors
    ///
    /// Returns an error if the trace cannot be stored.
    async fn record_run(&self, trace: &RunTrace) -> Result<()>;

    /// Name of the destination, for logs
    fn destination_name(&self) -> &str;
}

/// State storage trait for watermark persistence
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load a watermark from storage
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(Watermark))` if found, `Ok(None)` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails for reasons other than "not found".
    async fn load_watermark(&self, key: &WatermarkKey) -> Result<Option<Watermark>>;

    /// Upsert watermarks atomically; a stored value never decreases
    ///
    /// # Errors
    ///
    /// Returns an error if the save operation fails.
    async fn save_watermarks(&self, watermarks: &[Watermark]) -> Result<()>;

    /// Get all watermarks from storage
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn get_all_watermarks(&self) -> Result<Vec<Watermark>>;
}
