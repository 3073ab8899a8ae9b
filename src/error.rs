//! Error handling for snapverify
//!
//! Provides the crate-wide error type using thiserror. Comparison results are
//! not errors: a diff that finds differences is reported through
//! `VerifyStatus`, not through this enum.

use thiserror::Error;

/// Main error type for snapverify
#[derive(Error, Debug)]
pub enum SnapError {
    /// IO errors (local filesystem, process pipes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (paths, offsets, table contents)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The ssh client could not be started or waited on
    #[error("Failed to spawn remote session: {0}")]
    Spawn(String),

    /// Verification stage machine transition errors
    #[error("Stage transition error: {0}")]
    StageTransition(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors
    #[error("{0}")]
    General(String),
}

/// Result type alias for snapverify operations
pub type Result<T> = std::result::Result<T, SnapError>;

impl SnapError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}
