//! Configuration management for Harvest.
//!
//! TOML-based configuration with `${VAR_NAME}` substitution, `HARVEST_*`
//! environment overrides and validation on load.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use harvest::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("harvest.toml")?;
//!
//! println!("Kobo server: {}", config.kobo.base_url);
//! println!("Parallel forms: {}", config.sync.parallel_parents);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! database_target = "postgresql"
//!
//! [application]
//! log_level = "info"
//! pipeline_name = "harvest"
//!
//! [kobo]
//! base_url = "https://kf.kobotoolbox.org"
//! token = "${KOBO_TOKEN}"
//! project_view = "pv7BbDc3VCQn2zV8nfx4Ym"
//!
//! [sync]
//! submission_time_start = "2025-10-23"
//! parallel_parents = 4
//!
//! [postgresql]
//! connection_string = "${HARVEST_PG_URL}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{
    ApplicationConfig, DatabaseTarget, FormCursor, HarvestConfig, KoboConfig, LoggingConfig,
    PostgreSQLConfig, SyncConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
