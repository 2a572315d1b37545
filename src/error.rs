//! Error types
//!
//! Graph and queue operations that target a missing id do not error; they report
//! through `bool`/`Option` returns. The enums here cover the failures that do
//! propagate: storage, remote delivery, configuration and caller mistakes.

use std::time::Duration;
use thiserror::Error;

/// Local durable storage failures (sled, files, JSON encoding).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Family graph failures.
#[derive(Debug, Error)]
pub enum GraphError {
    /// `full_name` is the one attribute a person cannot be created without.
    #[error("Person requires a non-empty full name")]
    MissingName,

    #[error("Invalid value for person attribute '{key}': {reason}")]
    InvalidAttribute { key: String, reason: String },

    #[error("Relationship endpoint not found in graph: {0}")]
    DanglingEndpoint(String),

    #[error("Family not found: {0}")]
    FamilyNotFound(String),
}

/// Sync queue and remote delivery failures.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote {table}/{id} failed: {message}")]
    Remote {
        table: String,
        id: String,
        message: String,
    },

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{operation} for {table}/{id} requires a payload")]
    MissingPayload {
        table: String,
        id: String,
        operation: String,
    },

    #[error("Remote store not configured: {0}")]
    NotConfigured(String),

    #[error("No async runtime available to run the sync timer")]
    NoRuntime,

    #[error("Sync storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Top-level error for the family service and the CLI.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Person not found: {0}")]
    PersonNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
