//! Cursor store
//!
//! Owns the committed watermark values of a pipeline. Extractors read a value,
//! the orchestrator stages candidate advances, and a candidate becomes committed
//! only once the destination has confirmed the write that carried it.

use crate::adapters::database::traits::StateStorage;
use crate::core::state::watermark::{Watermark, WatermarkBuilder, WatermarkKey};
use crate::domain::{MissingPolicy, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Candidate watermark advances awaiting commit
///
/// Staging is a max reduction: staging the same key twice keeps the larger
/// value, in any order.
#[derive(Debug, Clone, Default)]
pub struct StagedAdvances {
    entries: BTreeMap<WatermarkKey, (DateTime<Utc>, MissingPolicy)>,
}

impl StagedAdvances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `candidate` for `key`, keeping the larger of it and any staged value
    pub fn stage(&mut self, key: WatermarkKey, candidate: DateTime<Utc>, policy: MissingPolicy) {
        self.entries
            .entry(key)
            .and_modify(|(value, _)| {
                if candidate > *value {
                    *value = candidate;
                }
            })
            .or_insert((candidate, policy));
    }

    /// Fold another set of staged advances into this one
    pub fn merge(&mut self, other: StagedAdvances) {
        for (key, (value, policy)) in other.entries {
            self.stage(key, value, policy);
        }
    }

    pub fn get(&self, key: &WatermarkKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|(value, _)| *value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &WatermarkKey> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cursor store backed by a [`StateStorage`]
pub struct CursorStore {
    storage: Arc<dyn StateStorage + Send + Sync>,
    pipeline_name: String,
    committed: RwLock<HashMap<WatermarkKey, Watermark>>,
}

impl CursorStore {
    /// Open the store, loading every committed watermark of the pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if the watermarks cannot be read from storage.
    pub async fn open(
        storage: Arc<dyn StateStorage + Send + Sync>,
        pipeline_name: impl Into<String>,
    ) -> Result<Self> {
        let pipeline_name = pipeline_name.into();
        let committed: HashMap<WatermarkKey, Watermark> = storage
            .get_all_watermarks()
            .await?
            .into_iter()
            .filter(|w| w.pipeline_name == pipeline_name)
            .map(|w| (w.key(), w))
            .collect();

        tracing::debug!(
            pipeline = %pipeline_name,
            count = committed.len(),
            "Loaded committed watermarks"
        );

        Ok(Self {
            storage,
            pipeline_name,
            committed: RwLock::new(committed),
        })
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Key of a watermark in this pipeline
    pub fn key(&self, resource: &str, cursor_field: &str, partition: &str) -> WatermarkKey {
        WatermarkKey::new(&self.pipeline_name, resource, cursor_field, partition)
    }

    /// Watermark to filter by: the committed value, or `initial` if nothing was
    /// committed yet or the configured start lies beyond the committed value
    pub async fn get(&self, key: &WatermarkKey, initial: DateTime<Utc>) -> DateTime<Utc> {
        match self.committed.read().await.get(key) {
            Some(watermark) => watermark.value.max(initial),
            None => initial,
        }
    }

    /// Last committed watermark for `key`
    pub async fn committed(&self, key: &WatermarkKey) -> Option<Watermark> {
        self.committed.read().await.get(key).cloned()
    }

    /// All committed watermarks, ordered by key
    pub async fn committed_watermarks(&self) -> Vec<Watermark> {
        let mut watermarks: Vec<Watermark> =
            self.committed.read().await.values().cloned().collect();
        watermarks.sort_by(|a, b| a.id.cmp(&b.id));
        watermarks
    }

    /// Turn staged advances into watermark updates, dropping any that would not
    /// move past the committed value
    pub async fn prepare(&self, staged: &StagedAdvances, load_id: &str) -> Vec<Watermark> {
        let committed = self.committed.read().await;
        staged
            .entries
            .iter()
            .filter(|(key, (value, _))| {
                committed
                    .get(*key)
                    .map(|existing| *value > existing.value)
                    .unwrap_or(true)
            })
            .map(|(key, (value, policy))| {
                WatermarkBuilder::new(key.clone(), *value)
                    .missing_policy(*policy)
                    .last_load_id(load_id)
                    .build()
            })
            .collect()
    }

    /// Record updates the destination has durably stored
    pub async fn confirm(&self, updates: &[Watermark]) {
        let mut committed = self.committed.write().await;
        for update in updates {
            committed
                .entry(update.key())
                .and_modify(|existing| {
                    if update.value > existing.value {
                        *existing = update.clone();
                    }
                })
                .or_insert_with(|| update.clone());
        }
    }

    /// Persist staged advances on their own, outside of a data batch
    ///
    /// # Errors
    ///
    /// Returns an error if storage rejects the updates; nothing is committed then.
    pub async fn commit(&self, staged: &StagedAdvances, load_id: &str) -> Result<Vec<Watermark>> {
        let updates = self.prepare(staged, load_id).await;
        if updates.is_empty() {
            return Ok(updates);
        }

        self.storage.save_watermarks(&updates).await?;
        self.confirm(&updates).await;

        tracing::info!(
            pipeline = %self.pipeline_name,
            count = updates.len(),
            "Committed watermarks"
        );

        Ok(updates)
    }
}
