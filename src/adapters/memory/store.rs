//! In-memory destination
//!
//! Implements [`StorageSink`] and [`StateStorage`] over process memory with the
//! same write semantics as the PostgreSQL adapter. Used for smoke runs without a
//! database and as the destination of the integration tests.

use crate::adapters::database::traits::{
    CommitHandle, LoadBatch, StateStorage, StorageSink,
};
use crate::core::cascade::summary::RunTrace;
use crate::core::state::watermark::{Watermark, WatermarkKey};
use crate::domain::{Result, WriteDisposition};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

/// A stored row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub key: String,
    pub record: Value,
    pub load_id: String,
}

#[derive(Default)]
struct MemoryState {
    tables: BTreeMap<String, Vec<StoredRow>>,
    watermarks: BTreeMap<String, Watermark>,
    runs: Vec<RunTrace>,
    replaced: HashSet<(String, String)>,
}

/// In-memory sink and state storage
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents stored in `table`, in insertion order
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|rows| rows.iter().map(|row| row.record.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn stored_rows(&self, table: &str) -> Vec<StoredRow> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Whether a table was ever created; tables appear with their first row
    pub async fn has_table(&self, table: &str) -> bool {
        self.state.lock().await.tables.contains_key(table)
    }

    pub async fn watermark(&self, key: &WatermarkKey) -> Option<Watermark> {
        self.state
            .lock()
            .await
            .watermarks
            .get(&key.generate_id())
            .cloned()
    }

    pub async fn runs(&self) -> Vec<RunTrace> {
        self.state.lock().await.runs.clone()
    }
}

fn upsert_watermarks(target: &mut BTreeMap<String, Watermark>, watermarks: &[Watermark]) {
    for watermark in watermarks {
        target
            .entry(watermark.id.clone())
            .and_modify(|existing| {
                if watermark.value > existing.value {
                    *existing = watermark.clone();
                }
            })
            .or_insert_with(|| watermark.clone());
    }
}

#[async_trait]
impl StorageSink for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn write(&self, batch: LoadBatch) -> Result<CommitHandle> {
        let mut state = self.state.lock().await;
        let rows_written = batch.records.len();

        if !batch.records.is_empty() {
            let replace_marker = (batch.load_id.clone(), batch.table.clone());
            let truncate = batch.disposition == WriteDisposition::Replace
                && !state.replaced.contains(&replace_marker);
            if truncate {
                state.replaced.insert(replace_marker);
            }

            let rows = state.tables.entry(batch.table.clone()).or_default();
            if truncate {
                rows.clear();
            }

            for record in batch.records {
                let row = StoredRow {
                    key: record.key,
                    record: record.body.to_json(),
                    load_id: batch.load_id.clone(),
                };
                match batch.disposition {
                    WriteDisposition::Merge => {
                        match rows.iter_mut().find(|existing| existing.key == row.key) {
                            Some(existing) => *existing = row,
                            None => rows.push(row),
                        }
                    }
                    WriteDisposition::Append | WriteDisposition::Replace => rows.push(row),
                }
            }
        }

        upsert_watermarks(&mut state.watermarks, &batch.watermarks);

        Ok(CommitHandle {
            table: batch.table,
            rows_written,
            watermarks_committed: batch.watermarks.len(),
        })
    }

    async fn record_run(&self, trace: &RunTrace) -> Result<()> {
        self.state.lock().await.runs.push(trace.clone());
        Ok(())
    }

    fn destination_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl StateStorage for MemoryStore {
    async fn load_watermark(&self, key: &WatermarkKey) -> Result<Option<Watermark>> {
        Ok(self.watermark(key).await)
    }

    async fn save_watermarks(&self, watermarks: &[Watermark]) -> Result<()> {
        let mut state = self.state.lock().await;
        upsert_watermarks(&mut state.watermarks, watermarks);
        Ok(())
    }

    async fn get_all_watermarks(&self) -> Result<Vec<Watermark>> {
        Ok(self
            .state
            .lock()
            .await
            .watermarks
            .values()
            .cloned()
            .collect())
    }
}
