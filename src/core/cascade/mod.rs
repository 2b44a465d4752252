//! Cascading extraction
//!
//! A [`CascadePlan`] lists resources from root to leaf; the
//! [`CascadeOrchestrator`] runs it level by level and reports a [`RunSummary`].

pub mod orchestrator;
pub mod plan;
pub mod summary;

pub use orchestrator::{CascadeOptions, CascadeOrchestrator};
pub use plan::CascadePlan;
pub use summary::{LevelReport, LevelState, RunStatus, RunSummary, RunTrace};
