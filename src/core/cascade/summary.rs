//! Run summary and reporting
//!
//! Per-level progress of a cascade run plus the serialisable trace stored by
//! the destination.

use crate::core::state::Watermark;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Progress of one cascade level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum LevelState {
    NotStarted,
    /// Reading parents and dispatching work
    ParentStreaming,
    /// Waiting on in-flight workers; `parent_index` is the last parent finished
    ChildDraining { parent_index: usize },
    Done,
    Failed,
    Interrupted,
}

impl fmt::Display for LevelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelState::NotStarted => write!(f, "not started"),
            LevelState::ParentStreaming => write!(f, "streaming parents"),
            LevelState::ChildDraining { parent_index } => {
                write!(f, "draining (parent {parent_index})")
            }
            LevelState::Done => write!(f, "done"),
            LevelState::Failed => write!(f, "failed"),
            LevelState::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Outcome of one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub resource: String,
    pub table: String,
    pub state: LevelState,

    /// Parents available to this level; 1 for a root resource
    pub parents_total: usize,
    pub parents_processed: usize,

    pub pages: usize,
    pub records_fetched: usize,
    /// Records that passed every filter
    pub records_extracted: usize,
    pub rows_written: usize,
    pub watermarks_committed: usize,
    /// Downloaded files that could not be parsed
    #[serde(default)]
    pub files_skipped: usize,

    pub error: Option<String>,
}

impl LevelReport {
    pub fn new(resource: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            table: table.into(),
            state: LevelState::NotStarted,
            parents_total: 0,
            parents_processed: 0,
            pages: 0,
            records_fetched: 0,
            records_extracted: 0,
            rows_written: 0,
            files_skipped: 0,
            watermarks_committed: 0,
            error: None,
        }
    }
}

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Summary of a cascade run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub load_id: String,
    pub pipeline_name: String,
    pub started_at: DateTime<Utc>,
    pub levels: Vec<LevelReport>,

    /// Resource whose level failed
    pub failed_resource: Option<String>,
    pub error: Option<String>,
    /// Whether the failure is worth a rerun
    pub retryable: bool,
    pub interrupted: bool,

    /// Watermarks of the pipeline as committed at the end of the run
    pub committed_watermarks: Vec<Watermark>,

    pub duration: Duration,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn new(load_id: impl Into<String>, pipeline_name: impl Into<String>) -> Self {
        Self {
            load_id: load_id.into(),
            pipeline_name: pipeline_name.into(),
            started_at: Utc::now(),
            levels: Vec::new(),
            failed_resource: None,
            error: None,
            retryable: false,
            interrupted: false,
            committed_watermarks: Vec::new(),
            duration: Duration::from_secs(0),
            dry_run: false,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.failed_resource.is_some() || self.error.is_some() {
            RunStatus::Failed
        } else if self.interrupted {
            RunStatus::Interrupted
        } else {
            RunStatus::Succeeded
        }
    }

    /// Check if every level finished
    pub fn is_successful(&self) -> bool {
        self.status() == RunStatus::Succeeded
    }

    pub fn level(&self, resource: &str) -> Option<&LevelReport> {
        self.levels.iter().find(|level| level.resource == resource)
    }

    pub fn total_rows_written(&self) -> usize {
        self.levels.iter().map(|level| level.rows_written).sum()
    }

    /// Serialisable snapshot for the destination
    pub fn trace(&self) -> RunTrace {
        RunTrace {
            load_id: self.load_id.clone(),
            pipeline_name: self.pipeline_name.clone(),
            status: self.status(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            failed_resource: self.failed_resource.clone(),
            error: self.error.clone(),
            levels: self.levels.clone(),
        }
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            load_id = %self.load_id,
            pipeline = %self.pipeline_name,
            status = %self.status(),
            rows_written = self.total_rows_written(),
            duration_secs = self.duration.as_secs(),
            dry_run = self.dry_run,
            "Sync completed"
        );

        for level in &self.levels {
            tracing::info!(
                resource = %level.resource,
                state = %level.state,
                parents = level.parents_processed,
                parents_total = level.parents_total,
                extracted = level.records_extracted,
                rows_written = level.rows_written,
                watermarks_committed = level.watermarks_committed,
                "Level summary"
            );
            if level.files_skipped > 0 {
                tracing::warn!(
                    resource = %level.resource,
                    files_skipped = level.files_skipped,
                    "Some downloaded files could not be read"
                );
            }
        }

        if let Some(ref resource) = self.failed_resource {
            tracing::error!(
                resource = %resource,
                error = self.error.as_deref().unwrap_or("unknown"),
                retryable = self.retryable,
                "Sync failed"
            );
            for watermark in &self.committed_watermarks {
                tracing::warn!(
                    watermark = %watermark.id,
                    value = %watermark.value,
                    "Last committed watermark"
                );
            }
        }
    }
}

/// Stored record of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub load_id: String,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub failed_resource: Option<String>,
    pub error: Option<String>,
    pub levels: Vec<LevelReport>,
}
