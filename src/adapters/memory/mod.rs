//! In-memory destination
//!
//! Keeps rows, watermarks and run traces in process memory.

pub mod store;

pub use store::{MemoryStore, StoredRow};
