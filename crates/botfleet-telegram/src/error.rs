// ABOUTME: Error types for botfleet-telegram.
// ABOUTME: Defines ServiceError covering config, store, and serialization failures.

use botfleet_core::StoreError;
use thiserror::Error;

/// Error types for the fleet service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration loading or validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tenant config store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// JSON rendering error for command output.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ServiceError.
pub type Result<T> = std::result::Result<T, ServiceError>;
