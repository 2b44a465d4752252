// Harvest - KoboToolbox to PostgreSQL ETL Tool
// Copyright (c) 2025 Harvest Contributors
// Licensed under the MIT License

//! # Harvest - KoboToolbox to PostgreSQL ETL
//!
//! Harvest incrementally extracts survey data from a KoboToolbox server and
//! loads it into PostgreSQL.
//!
//! ## Overview
//!
//! - **Extracting** forms, their submissions and the submissions' attachments
//!   through the paginated KoboToolbox v2 API
//! - **Transforming** submissions into metadata plus ordered question/response
//!   pairs, since every form asks different questions
//! - **Loading** rows and the watermarks they justify in one transaction
//! - **Resuming** from per-form watermarks, so a rerun only fetches what is new
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Cascade orchestration, extraction, cursor state, transforms
//! - [`adapters`] - KoboToolbox, PostgreSQL and in-memory integrations
//! - [`domain`] - Records, resource definitions and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harvest::adapters::database::create_sink_and_state;
//! use harvest::adapters::kobo::{kobo_plan, KoboClient};
//! use harvest::config::load_config;
//! use harvest::core::cascade::{CascadeOptions, CascadeOrchestrator};
//! use harvest::core::state::CursorStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("harvest.toml")?;
//!     let (sink, state) = create_sink_and_state(&config)?;
//!     sink.ensure_schema().await?;
//!
//!     let cursors = CursorStore::open(state, &config.application.pipeline_name).await?;
//!     let orchestrator = CascadeOrchestrator::new(
//!         Arc::new(KoboClient::new(&config.kobo)?),
//!         Arc::new(cursors),
//!         sink,
//!         CascadeOptions::default(),
//!     );
//!
//!     let summary = orchestrator.run(&kobo_plan(&config.kobo, &config.sync)?).await;
//!     println!("Wrote {} rows", summary.total_rows_written());
//!     Ok(())
//! }
//! ```
//!
//! ## Incremental Sync
//!
//! Every resource names a cursor field. The largest value loaded so far is
//! stored as a watermark and the next sync asks the server only for records
//! at or after it:
//!
//! ```rust
//! use harvest::core::extract::cursor_params;
//! use harvest::domain::{CursorFilter, DEFAULT_CURSOR_FORMAT};
//! use chrono::{TimeZone, Utc};
//!
//! let watermark = Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 20).unwrap();
//! let params = cursor_params(
//!     &CursorFilter::JsonDocument { param: "query".to_string() },
//!     "_submission_time",
//!     &watermark,
//!     DEFAULT_CURSOR_FORMAT,
//! );
//!
//! assert_eq!(
//!     params,
//!     vec![(
//!         "query".to_string(),
//!         r#"{"_submission_time":{"$gte":"2025-11-01T00:00:20"}}"#.to_string()
//!     )]
//! );
//! ```
//!
//! ## Error Handling
//!
//! The library returns [`domain::HarvestError`]; the CLI maps it to exit codes.
//!
//! ```rust,no_run
//! use harvest::domain::HarvestError;
//!
//! fn example() -> Result<(), HarvestError> {
//!     let config = harvest::config::load_config("harvest.toml")?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
