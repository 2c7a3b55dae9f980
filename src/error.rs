//! # Structured Error Handling
//!
//! Error taxonomy for the synchronization core. Collaborator failures
//! (store, runtime API, Git host) carry the upstream message; per-item
//! failures inside a sync pass are NOT represented here; they are collected
//! into the pass outcome's `errors` list so one bad workflow never aborts a
//! batch (see [`crate::engines`]).

use thiserror::Error;

/// Top-level error type for synchronization operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Relational store failure (query, connection, constraint other than
    /// the non-terminal job uniqueness constraint).
    #[error("store error: {0}")]
    Store(String),

    /// Workflow runtime API failure (listing or fetching workflows).
    #[error("runtime api error: {0}")]
    Runtime(String),

    /// Git host failure (head resolution, file listing, reads).
    #[error("git host error: {0}")]
    GitHost(String),

    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A non-terminal sync job already exists for this
    /// (tenant, environment, kind). Resolved internally by the orchestrator
    /// via re-query; callers of `request_sync` never observe it.
    #[error("a non-terminal sync job already exists for this environment and kind")]
    JobConflict,

    /// Referenced entity does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
