//! External system integrations for Harvest.
//!
//! - [`kobo`] - KoboToolbox API client, paginator and resource definitions
//! - [`database`] - Destination abstraction layer (trait-based)
//! - [`postgresql`] - PostgreSQL destination
//! - [`memory`] - In-process destination
//!
//! # Kobo Adapter
//!
//! ```rust,no_run
//! use harvest::adapters::kobo::{paginate, KoboClient, PageRequest};
//! use harvest::config::{secret_string, KoboConfig};
//! use futures::TryStreamExt;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KoboConfig {
//!     base_url: "https://kf.kobotoolbox.org".to_string(),
//!     token: secret_string("token".to_string()),
//!     project_view: "pv1".to_string(),
//!     timeout_seconds: 60,
//!     page_size: 5000,
//!     ignored_status_codes: vec![404, 502],
//!     enable_http_logging: true,
//! };
//!
//! let client = Arc::new(KoboClient::new(&config)?);
//! let pages: Vec<_> = paginate(client, PageRequest::new("kobo_asset", "/api/v2/assets/"))
//!     .try_collect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod kobo;
pub mod memory;
pub mod postgresql;
