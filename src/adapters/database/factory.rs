//! Destination factory
//!
//! Builds the sink and the state storage named by `database_target`. Both
//! share one underlying client so rows and watermarks go through the same pool.

use crate::adapters::database::traits::{StateStorage, StorageSink};
use crate::adapters::memory::MemoryStore;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{DatabaseTarget, HarvestConfig};
use crate::domain::{HarvestError, Result};
use std::sync::Arc;

/// Create the sink and state storage for the configured destination
///
/// # Errors
///
/// Returns `Configuration` if the destination section is missing, or the
/// client's error if it cannot be created.
pub fn create_sink_and_state(
    config: &HarvestConfig,
) -> Result<(Arc<dyn StorageSink>, Arc<dyn StateStorage + Send + Sync>)> {
    match config.database_target {
        DatabaseTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                HarvestError::Configuration(
                    "postgresql configuration is required when database_target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL sink and state storage");
            let client = Arc::new(PostgreSQLClient::new(pg_config.clone())?);
            let adapter = Arc::new(
                PostgreSQLAdapter::new_with_arc(client).with_dry_run(config.application.dry_run),
            );

            Ok((
                adapter.clone() as Arc<dyn StorageSink>,
                adapter as Arc<dyn StateStorage + Send + Sync>,
            ))
        }
        DatabaseTarget::Memory => {
            tracing::info!("Creating in-memory sink and state storage");
            let store = Arc::new(MemoryStore::new());

            Ok((
                store.clone() as Arc<dyn StorageSink>,
                store as Arc<dyn StateStorage + Send + Sync>,
            ))
        }
    }
}
