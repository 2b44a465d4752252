//! Domain error types
//!
//! This module defines the error hierarchy for Harvest. Errors are domain-specific
//! and don't expose third-party client types to callers.

use thiserror::Error;

/// Main Harvest error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors raised while talking to the KoboToolbox API
    #[error("Transport error: {0}")]
    Transport(#[from] KoboError),

    /// An accepted record lacks the cursor field and the resource refuses such records
    #[error(
        "Cursor field '{cursor_field}' missing in record {record_key} of resource '{resource}'"
    )]
    CursorFieldMissing {
        resource: String,
        cursor_field: String,
        record_key: String,
    },

    /// A child endpoint needs a parent field that the parent record does not carry
    #[error("Parent record for resource '{resource}' has no field '{field}'")]
    MissingJoinField { resource: String, field: String },

    /// Record reshaping failed
    #[error("Transform error: {0}")]
    Transform(String),

    /// Destination write failed; no watermark was committed for the batch
    #[error("Sink error: {0}")]
    Sink(String),

    /// Network/connection errors towards the destination
    #[error("Connection error: {0}")]
    Connection(String),

    /// State management errors
    #[error("State management error: {0}")]
    State(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl HarvestError {
    /// Whether rerunning the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            HarvestError::Transport(e) => e.is_retryable(),
            HarvestError::Connection(_) => true,
            _ => false,
        }
    }
}

/// KoboToolbox-specific errors
///
/// Errors that occur when fetching pages from a KoboToolbox server.
#[derive(Debug, Error)]
pub enum KoboError {
    /// Failed to reach the server
    #[error("Failed to connect to KoboToolbox server: {0}")]
    ConnectionFailed(String),

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Server answered with a status that is neither success nor ignored
    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// Response body is not a page envelope
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// Request URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl KoboError {
    /// Transport errors worth a rerun: timeouts, dropped connections, throttling and 5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            KoboError::ConnectionFailed(_) | KoboError::Timeout(_) => true,
            KoboError::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            KoboError::InvalidResponse(_) | KoboError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for KoboError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            KoboError::Timeout(err.to_string())
        } else if err.is_decode() {
            KoboError::InvalidResponse(err.to_string())
        } else {
            KoboError::ConnectionFailed(err.to_string())
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for HarvestError {
    fn from(err: toml::de::Error) -> Self {
        HarvestError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<tokio_postgres::Error> for HarvestError {
    fn from(err: tokio_postgres::Error) -> Self {
        HarvestError::Sink(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for HarvestError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        HarvestError::Connection(err.to_string())
    }
}
