//! Error types for the Silk SDP reconciler
//!
//! Provides structured error types for the SDP client, the per-resource
//! reconcilers, and the plan/apply engine.

use thiserror::Error;

/// Unified error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Manifest validation failed: {0}")]
    Validation(String),

    // =========================================================================
    // SDP API Errors
    // =========================================================================
    #[error("SDP API error during {operation}: {reason}")]
    Api { operation: String, reason: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resource not found on the SDP server: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("Resource already exists on the SDP server: {kind}/{name}")]
    AlreadyExists { kind: String, name: String },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    #[error("Field `{field}` of {kind} can not be changed after creation")]
    Immutable { kind: String, field: String },

    #[error("Volume {name} has allow_destroy set to false and can not be destroyed")]
    DestroyProtected { name: String },

    // =========================================================================
    // Parse/IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an API failure tied to a named operation
    pub fn api(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Api {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is worth retrying on a later reconciliation run.
    ///
    /// Transport failures are transient; validation and immutability errors
    /// will fail identically until the manifest changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Api { .. })
    }
}

/// Result type alias for the reconciler
pub type Result<T> = std::result::Result<T, Error>;
