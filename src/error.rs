//! Error types for `MockNet`

use std::io;
use thiserror::Error;

/// Result type for `MockNet` operations
pub type Result<T> = std::result::Result<T, MockError>;

/// Errors that can occur in `MockNet`
#[derive(Debug, Error)]
pub enum MockError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stub definition rejected by the registry
    #[error("Invalid stub definition: {0}")]
    Validation(String),

    /// Recording target is empty or not an absolute http(s) URL
    #[error("Invalid recording target: {0}")]
    InvalidTarget(String),

    /// Storage read or write failed
    #[error("Persistence failure for '{key}': {reason}")]
    Persistence {
        /// Key of the document involved
        key: String,
        /// Underlying cause
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Forwarding to the recording target failed
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl MockError {
    /// Shorthand for a [`MockError::Persistence`] error
    pub fn persistence(key: &str, reason: impl std::fmt::Display) -> Self {
        Self::Persistence {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
