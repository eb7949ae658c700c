// ABOUTME: Error types for botfleet-core.
// ABOUTME: Store, registry, and worker launch failures.

use crate::config::TenantId;
use thiserror::Error;

/// Errors raised by the tenant configuration store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database query or connection failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the registry when an insert would break the one-live-handle rule.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A handle whose task is still running already exists for the tenant.
    #[error("a live worker is already registered for tenant {0}")]
    AlreadyLive(TenantId),
}

/// Errors raised by a worker factory while building a tenant's session.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The network session could not be constructed.
    #[error("failed to open session: {0}")]
    Session(String),

    /// The configuration was rejected by the factory.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
