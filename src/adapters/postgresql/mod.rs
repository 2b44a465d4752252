//! PostgreSQL destination
//!
//! Resource tables, EAV response tables and the `_harvest_*` bookkeeping
//! tables, written through a `deadpool-postgres` pool.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
pub use models::{PostgreSQLRecord, PostgreSQLRun, PostgreSQLWatermark};
