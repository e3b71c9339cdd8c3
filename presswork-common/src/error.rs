//! Common error types for Presswork

use thiserror::Error;

/// Common result type for Presswork operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the workflow core, the HTTP surface and terminals
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or malformed required field (blank actor, quantity < 1, empty reason)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity exists but its state does not permit the requested action
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A concurrent writer got there first
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store or push channel temporarily unavailable
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
