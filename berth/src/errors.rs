//! Error types for the berth control plane

use std::time::Duration;

use thiserror::Error;

/// Main error type for the deployment core
#[derive(Error, Debug)]
pub enum BerthError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Source fetch error: {0}")]
    SourceFetch(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Runtime resource error: {0}")]
    RuntimeResource(#[from] RuntimeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Deployment queue is full")]
    QueueFull,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for BerthError {
    fn from(err: anyhow::Error) -> Self {
        BerthError::Internal(err.to_string())
    }
}

/// Errors reported by a container runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The resource already exists (or is already attached). Callers adopt it.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The runtime could not be reached. Safe to retry.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete in time. Safe to retry.
    #[error("runtime call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Fatal(String),
}

impl RuntimeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::Unavailable(_) | RuntimeError::Timeout(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RuntimeError::Conflict(_))
    }
}

/// Errors reported by the persistence collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// Transient backend failure. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot could not be written. Safe to retry.
    #[error("store IO error: {0}")]
    Io(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}
