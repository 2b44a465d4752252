//! Logging and observability
//!
//! Structured `tracing` output to the console and, optionally, to a rotating
//! JSON file.
//!
//! # Example
//!
//! ```no_run
//! use harvest::logging::init_logging;
//! use harvest::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(resource = "kobo_submission", "Level started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a cascade level
///
/// # Example
///
/// ```no_run
/// use harvest::log_level_start;
///
/// log_level_start!("kobo_submission", 12);
/// ```
#[macro_export]
macro_rules! log_level_start {
    ($resource:expr, $parents:expr) => {
        tracing::info!(
            resource = %$resource,
            parents = $parents,
            "Starting level"
        );
    };
}

/// Log the completion of a cascade level
///
/// # Example
///
/// ```no_run
/// use harvest::log_level_complete;
/// use std::time::Duration;
///
/// log_level_complete!("kobo_submission", 42, Duration::from_secs(3));
/// ```
#[macro_export]
macro_rules! log_level_complete {
    ($resource:expr, $rows:expr, $duration:expr) => {
        tracing::info!(
            resource = %$resource,
            rows_written = $rows,
            duration_ms = $duration.as_millis() as u64,
            "Level completed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use harvest::log_error_with_context;
/// use harvest::domain::HarvestError;
///
/// let error = HarvestError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
