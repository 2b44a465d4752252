//! Core business logic for Harvest.
//!
//! # Modules
//!
//! - [`cascade`] - Level-by-level orchestration of parent and child resources
//! - [`extract`] - Paginated, watermark-filtered extraction of one resource
//! - [`state`] - Cursor store and watermarks for incremental syncs
//! - [`transform`] - Timestamp normalisation and EAV reshaping
//!
//! # Sync Workflow
//!
//! 1. **Load State**: Read committed watermarks from the destination
//! 2. **Extract**: Page through each resource, filtered at the watermark
//! 3. **Transform**: Normalise timestamps and reshape submissions
//! 4. **Load**: Write rows and their watermarks in one transaction
//! 5. **Cascade**: Feed accepted records to the next level as parents
//! 6. **Report**: Log and store a run summary
//!
//! # Example
//!
//! ```rust,no_run
//! use harvest::adapters::database::create_sink_and_state;
//! use harvest::adapters::kobo::{kobo_plan, KoboClient};
//! use harvest::config::load_config;
//! use harvest::core::cascade::{CascadeOptions, CascadeOrchestrator};
//! use harvest::core::state::CursorStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("harvest.toml")?;
//! let (sink, state) = create_sink_and_state(&config)?;
//! let cursors = CursorStore::open(state, &config.application.pipeline_name).await?;
//! let plan = kobo_plan(&config.kobo, &config.sync)?;
//!
//! let orchestrator = CascadeOrchestrator::new(
//!     Arc::new(KoboClient::new(&config.kobo)?),
//!     Arc::new(cursors),
//!     sink,
//!     CascadeOptions::default(),
//! );
//! let summary = orchestrator.run(&plan).await;
//! println!("Rows written: {}", summary.total_rows_written());
//! # Ok(())
//! # }
//! ```

pub mod cascade;
pub mod extract;
pub mod state;
pub mod transform;
