//! Destination abstraction layer
//!
//! Traits every destination implements, plus the factory choosing one from
//! configuration.

pub mod factory;
pub mod traits;

pub use factory::create_sink_and_state;
pub use traits::{CommitHandle, LoadBatch, LoadRecord, StateStorage, StorageSink};
