//! Cascade orchestrator
//!
//! Runs the levels of a [`CascadePlan`] in order. Every level waits for the
//! previous one to finish; child levels fan out over their parents on a
//! bounded worker pool.
//!
//! Watermarks of the deepest level travel with its rows in the same sink
//! write. Levels that feed other levels only stage their advances, which are
//! committed once every level has finished, so a parent cursor never moves
//! past parents whose children were not loaded.

use super::plan::CascadePlan;
use super::summary::{LevelReport, LevelState, RunSummary};
use crate::adapters::database::traits::{LoadBatch, LoadRecord, StorageSink};
use crate::adapters::kobo::paginator::Paginator;
use crate::core::extract::{ExtractionStats, ResourceExtractor};
use crate::core::state::{CursorStore, StagedAdvances};
use crate::core::transform::{reshape, EavTransformer};
use crate::domain::{CursorScope, HarvestError, RawRecord, ResourceSpec, Result};
use crate::{log_level_complete, log_level_start};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use uuid::Uuid;

/// Orchestrator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOptions {
    /// Parents processed concurrently within a level
    pub parallel_parents: usize,

    /// Extract and transform, but neither write rows nor commit watermarks
    pub dry_run: bool,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self {
            parallel_parents: 4,
            dry_run: false,
        }
    }
}

/// Result of one extraction unit: a root resource, or one parent of a child level
#[derive(Default)]
struct UnitOutcome {
    /// Parents of the next level: accepted records plus forwarded ones
    records: Vec<RawRecord>,
    /// Accepted records
    extracted: usize,
    /// Advances left for the caller to commit
    staged: StagedAdvances,
    stats: ExtractionStats,
    rows_written: usize,
    watermarks_committed: usize,
}

#[derive(Default)]
struct LevelOutcome {
    /// Accepted records, the parents of the next level
    records: Vec<RawRecord>,
    staged: StagedAdvances,
    failure: Option<HarvestError>,
    interrupted: bool,
}

struct LevelContext<'a> {
    spec: &'a ResourceSpec,
    load_id: &'a str,
    /// Whether rows and watermarks are written together
    commit_inline: bool,
}

/// Cascade orchestrator
pub struct CascadeOrchestrator {
    extractor: ResourceExtractor,
    cursors: Arc<CursorStore>,
    sink: Arc<dyn StorageSink>,
    eav: EavTransformer,
    options: CascadeOptions,
    shutdown: watch::Receiver<bool>,
}

impl CascadeOrchestrator {
    pub fn new(
        paginator: Arc<dyn Paginator>,
        cursors: Arc<CursorStore>,
        sink: Arc<dyn StorageSink>,
        options: CascadeOptions,
    ) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self {
            extractor: ResourceExtractor::new(paginator, cursors.clone()),
            cursors,
            sink,
            eav: EavTransformer::default(),
            options,
            shutdown,
        }
    }

    /// Stop dispatching new work once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_eav(mut self, eav: EavTransformer) -> Self {
        self.eav = eav;
        self
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run every level of `plan`
    ///
    /// Never fails as a whole: the returned summary names the failing resource,
    /// and everything written before the failure stays written.
    pub async fn run(&self, plan: &CascadePlan) -> RunSummary {
        let started = Instant::now();
        let load_id = Uuid::new_v4().to_string();
        let mut summary = RunSummary::new(&load_id, self.cursors.pipeline_name());
        summary.dry_run = self.options.dry_run;
        summary.levels = plan
            .levels()
            .iter()
            .map(|spec| LevelReport::new(&spec.name, &spec.table_name))
            .collect();

        tracing::info!(
            load_id = %load_id,
            pipeline = %self.cursors.pipeline_name(),
            levels = plan.len(),
            destination = self.sink.destination_name(),
            dry_run = self.options.dry_run,
            "Starting sync"
        );

        let mut deferred = StagedAdvances::new();
        let mut parents: Vec<RawRecord> = Vec::new();
        let mut completed_levels = 0;

        for (index, spec) in plan.levels().iter().enumerate() {
            if self.shutdown_requested() {
                tracing::warn!(resource = %spec.name, "Shutdown requested, not starting level");
                summary.interrupted = true;
                break;
            }

            let has_descendants = plan.has_descendants(index);
            let per_parent = spec
                .cursor
                .as_ref()
                .map_or(true, |cursor| cursor.scope == CursorScope::PerParent);
            let ctx = LevelContext {
                spec,
                load_id: &load_id,
                commit_inline: !has_descendants && (index == 0 || per_parent),
            };

            let level_started = Instant::now();
            let report = &mut summary.levels[index];
            let outcome = if index == 0 {
                self.run_root(&ctx, report).await
            } else {
                self.run_children(&ctx, &plan.levels()[index - 1], &parents, report)
                    .await
            };

            if let Some(error) = outcome.failure {
                tracing::error!(
                    resource = %spec.name,
                    error = %error,
                    retryable = error.is_retryable(),
                    "Level failed"
                );
                report.state = LevelState::Failed;
                report.error = Some(error.to_string());
                summary.failed_resource = Some(spec.name.clone());
                summary.retryable = error.is_retryable();
                summary.error = Some(error.to_string());
                break;
            }

            if outcome.interrupted {
                tracing::warn!(
                    resource = %spec.name,
                    processed = report.parents_processed,
                    total = report.parents_total,
                    "Level interrupted"
                );
                report.state = LevelState::Interrupted;
                summary.interrupted = true;
                break;
            }

            if has_descendants {
                deferred.merge(outcome.staged);
            } else if !outcome.staged.is_empty() {
                // Resource-wide cursor of the deepest level: all parents are loaded now
                match self.commit_staged(&outcome.staged, &load_id).await {
                    Ok(count) => report.watermarks_committed += count,
                    Err(error) => {
                        report.state = LevelState::Failed;
                        report.error = Some(error.to_string());
                        summary.failed_resource = Some(spec.name.clone());
                        summary.retryable = error.is_retryable();
                        summary.error = Some(error.to_string());
                        break;
                    }
                }
            }

            report.state = LevelState::Done;
            log_level_complete!(spec.name, report.rows_written, level_started.elapsed());
            parents = outcome.records;
            completed_levels += 1;
        }

        if completed_levels == plan.len() && !deferred.is_empty() {
            match self.commit_staged(&deferred, &load_id).await {
                Ok(_) => {
                    for key in deferred.keys() {
                        if let Some(level) = summary
                            .levels
                            .iter_mut()
                            .find(|level| level.resource == key.resource_name)
                        {
                            level.watermarks_committed += 1;
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "Failed to commit parent watermarks");
                    summary.failed_resource = deferred.keys().next().map(|k| k.resource_name.clone());
                    summary.retryable = error.is_retryable();
                    summary.error = Some(error.to_string());
                }
            }
        } else if !deferred.is_empty() {
            tracing::warn!(
                count = deferred.len(),
                "Run did not complete, parent watermarks left unchanged"
            );
        }

        summary.committed_watermarks = self.cursors.committed_watermarks().await;
        summary.duration = started.elapsed();

        if !self.options.dry_run {
            if let Err(error) = self.sink.record_run(&summary.trace()).await {
                tracing::warn!(error = %error, load_id = %load_id, "Failed to record run trace");
            }
        }

        summary.log_summary();
        summary
    }

    async fn run_root(&self, ctx: &LevelContext<'_>, report: &mut LevelReport) -> LevelOutcome {
        report.parents_total = 1;
        report.state = LevelState::ParentStreaming;
        log_level_start!(ctx.spec.name, 1);

        match self.process_unit(ctx, None, "").await {
            Ok(unit) => {
                report.parents_processed = 1;
                record_unit(report, &unit);
                LevelOutcome {
                    records: unit.records,
                    staged: unit.staged,
                    ..Default::default()
                }
            }
            Err(error) => LevelOutcome {
                failure: Some(error),
                ..Default::default()
            },
        }
    }

    async fn run_children(
        &self,
        ctx: &LevelContext<'_>,
        parent_spec: &ResourceSpec,
        parents: &[RawRecord],
        report: &mut LevelReport,
    ) -> LevelOutcome {
        report.parents_total = parents.len();
        report.state = LevelState::ParentStreaming;
        log_level_start!(ctx.spec.name, parents.len());

        let abort = AtomicBool::new(false);
        let shutdown = self.shutdown.clone();
        let mut outcome = LevelOutcome::default();

        let mut workers = stream::iter(parents.iter().enumerate())
            .take_while(|_| {
                let stop = abort.load(Ordering::SeqCst) || *shutdown.borrow();
                futures::future::ready(!stop)
            })
            .map(|(parent_index, parent)| {
                let partition = parent_spec.partition_key(parent);
                async move {
                    let result = self.process_unit(ctx, Some(parent), &partition).await;
                    (parent_index, partition, result)
                }
            })
            .buffer_unordered(self.options.parallel_parents.max(1));

        while let Some((parent_index, partition, result)) = workers.next().await {
            report.state = LevelState::ChildDraining { parent_index };
            match result {
                Ok(unit) => {
                    report.parents_processed += 1;
                    record_unit(report, &unit);
                    outcome.records.extend(unit.records);
                    outcome.staged.merge(unit.staged);
                }
                Err(error) => {
                    tracing::error!(
                        resource = %ctx.spec.name,
                        parent = %partition,
                        error = %error,
                        "Parent failed, stopping dispatch"
                    );
                    abort.store(true, Ordering::SeqCst);
                    if outcome.failure.is_none() {
                        outcome.failure = Some(error);
                    }
                }
            }
        }

        if outcome.failure.is_none() && report.parents_processed < parents.len() {
            outcome.interrupted = true;
        }
        outcome
    }

    /// Extract, transform and load one unit
    async fn process_unit(
        &self,
        ctx: &LevelContext<'_>,
        parent: Option<&RawRecord>,
        partition: &str,
    ) -> Result<UnitOutcome> {
        let spec = ctx.spec;
        let extraction = self.extractor.extract(spec, parent, partition).await?;

        let mut staged = StagedAdvances::new();
        if let (Some(key), Some(candidate), Some(cursor)) = (
            extraction.watermark_key.clone(),
            extraction.candidate,
            spec.cursor.as_ref(),
        ) {
            staged.stage(key, candidate, cursor.missing_policy);
        }

        let rows: Vec<LoadRecord> = if spec.selected {
            extraction
                .records
                .iter()
                .map(|record| LoadRecord {
                    key: spec.record_key(record),
                    body: reshape(spec.shape, record.clone(), &self.eav),
                })
                .collect()
        } else {
            Vec::new()
        };

        let watermarks = if ctx.commit_inline {
            self.cursors.prepare(&staged, ctx.load_id).await
        } else {
            Vec::new()
        };

        let extracted = extraction.records.len();
        let mut records = extraction.records;
        records.extend(extraction.forwarded);

        let mut unit = UnitOutcome {
            records,
            extracted,
            staged: if ctx.commit_inline {
                StagedAdvances::new()
            } else {
                staged
            },
            stats: extraction.stats,
            ..Default::default()
        };

        let batch = LoadBatch {
            load_id: ctx.load_id.to_string(),
            resource: spec.name.clone(),
            table: spec.table_name.clone(),
            primary_key: spec.primary_key.clone(),
            disposition: spec.write_disposition,
            records: rows,
            watermarks: watermarks.clone(),
        };

        if batch.is_empty() {
            return Ok(unit);
        }

        if self.options.dry_run {
            tracing::info!(
                resource = %spec.name,
                partition,
                "DRY RUN: Would write {} rows to '{}' and commit {} watermarks",
                batch.records.len(),
                batch.table,
                batch.watermarks.len()
            );
            return Ok(unit);
        }

        let handle = self.sink.write(batch).await?;
        self.cursors.confirm(&watermarks).await;

        tracing::debug!(
            resource = %spec.name,
            partition,
            table = %handle.table,
            rows = handle.rows_written,
            watermarks = handle.watermarks_committed,
            "Batch committed"
        );

        unit.rows_written = handle.rows_written;
        unit.watermarks_committed = handle.watermarks_committed;
        Ok(unit)
    }

    async fn commit_staged(&self, staged: &StagedAdvances, load_id: &str) -> Result<usize> {
        if self.options.dry_run {
            tracing::info!("DRY RUN: Would commit {} watermarks", staged.len());
            return Ok(0);
        }
        Ok(self.cursors.commit(staged, load_id).await?.len())
    }
}

fn record_unit(report: &mut LevelReport, unit: &UnitOutcome) {
    report.pages += unit.stats.pages;
    report.records_fetched += unit.stats.fetched;
    report.records_extracted += unit.extracted;
    report.rows_written += unit.rows_written;
    report.watermarks_committed += unit.watermarks_committed;
    report.files_skipped += unit.stats.unreadable_files;
}
