//! PostgreSQL row models
//!
//! Mappings between domain types and the rows of `_harvest_watermarks`,
//! `_harvest_runs` and the per-resource tables.

use crate::adapters::database::traits::LoadRecord;
use crate::core::cascade::summary::RunTrace;
use crate::core::state::watermark::Watermark;
use crate::domain::{HarvestError, MissingPolicy, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio_postgres::Row;

/// Row of `_harvest_watermarks`
#[derive(Debug, Clone, PartialEq)]
pub struct PostgreSQLWatermark {
    pub id: String,
    pub pipeline_name: String,
    pub resource_name: String,
    pub cursor_field: String,
    pub partition_key: String,
    pub value: DateTime<Utc>,
    pub missing_policy: String,
    pub last_load_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PostgreSQLWatermark {
    pub fn from_domain(watermark: &Watermark) -> Self {
        Self {
            id: watermark.id.clone(),
            pipeline_name: watermark.pipeline_name.clone(),
            resource_name: watermark.resource_name.clone(),
            cursor_field: watermark.cursor_field.clone(),
            partition_key: watermark.partition.clone(),
            value: watermark.value,
            missing_policy: watermark.missing_policy.to_string(),
            last_load_id: watermark.last_load_id.clone(),
            updated_at: watermark.updated_at,
        }
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            pipeline_name: row.try_get("pipeline_name")?,
            resource_name: row.try_get("resource_name")?,
            cursor_field: row.try_get("cursor_field")?,
            partition_key: row.try_get("partition_key")?,
            value: row.try_get("value")?,
            missing_policy: row.try_get("missing_policy")?,
            last_load_id: row.try_get("last_load_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Convert to domain Watermark
    pub fn to_domain(&self) -> Result<Watermark> {
        let missing_policy: MissingPolicy = self.missing_policy.parse().map_err(|_| {
            HarvestError::State(format!(
                "Watermark {} has unknown missing policy '{}'",
                self.id, self.missing_policy
            ))
        })?;

        Ok(Watermark {
            id: self.id.clone(),
            pipeline_name: self.pipeline_name.clone(),
            resource_name: self.resource_name.clone(),
            cursor_field: self.cursor_field.clone(),
            partition: self.partition_key.clone(),
            value: self.value,
            missing_policy,
            last_load_id: self.last_load_id.clone(),
            updated_at: self.updated_at,
        })
    }
}

/// Row of `_harvest_runs`
#[derive(Debug, Clone, PartialEq)]
pub struct PostgreSQLRun {
    pub load_id: String,
    pub pipeline_name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub failed_resource: Option<String>,
    pub error: Option<String>,
    pub levels: Value,
}

impl PostgreSQLRun {
    pub fn from_domain(trace: &RunTrace) -> Result<Self> {
        Ok(Self {
            load_id: trace.load_id.clone(),
            pipeline_name: trace.pipeline_name.clone(),
            status: trace.status.to_string(),
            started_at: trace.started_at,
            finished_at: trace.finished_at,
            failed_resource: trace.failed_resource.clone(),
            error: trace.error.clone(),
            levels: serde_json::to_value(&trace.levels)?,
        })
    }
}

/// Row of a resource table
#[derive(Debug, Clone, PartialEq)]
pub struct PostgreSQLRecord {
    pub record_key: String,
    /// Record columns; for EAV resources the metadata only
    pub record: Value,
    pub responses: Vec<PostgreSQLResponse>,
}

/// Row of a `<table>__responses` table
#[derive(Debug, Clone, PartialEq)]
pub struct PostgreSQLResponse {
    pub position: i32,
    pub question: String,
    pub response: Value,
}

impl PostgreSQLRecord {
    pub fn from_domain(record: &LoadRecord) -> Self {
        let responses = record
            .body
            .responses()
            .iter()
            .enumerate()
            .map(|(position, entry)| PostgreSQLResponse {
                position: position as i32,
                question: entry.question.clone(),
                response: entry.response.to_json(),
            })
            .collect();

        Self {
            record_key: record.key.clone(),
            record: Value::Object(record.body.columns().clone()),
            responses,
        }
    }
}

/// Keep the last record per key, at the position of its first occurrence
pub fn dedup_by_key(records: Vec<LoadRecord>) -> Vec<LoadRecord> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<LoadRecord> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.key) {
            Some(&index) => unique[index] = record,
            None => {
                positions.insert(record.key.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}
