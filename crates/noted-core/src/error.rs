//! Error types for noted-core

use thiserror::Error;

/// Result type alias using noted-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in noted-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Sync endpoint returned an error response
    #[error("Sync API error: {0}")]
    Api(String),

    /// Credential rejected by the sync endpoint
    #[error("Sync authorization failed: {0}")]
    Unauthorized(String),

    /// Another sync cycle is already in flight
    #[error("A sync cycle is already running")]
    SyncInProgress,
}
