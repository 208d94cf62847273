//! Error types for wtr-core.

use thiserror::Error;

/// Result type alias using wtr-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for relay operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Message store does not exist and was not created within timeout")]
    StoreUnavailable,

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Routing errors
    #[error("Orchestrator session not found: {0}")]
    OrchestratorNotFound(String),

    #[error("Invalid argument: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
