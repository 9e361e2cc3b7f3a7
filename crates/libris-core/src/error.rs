//! Error types for libris.

use thiserror::Error;

/// Result type alias using libris's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for libris operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found (library, book, item, record)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violated (duplicate name, duplicate membership, self-nesting)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authenticated but not allowed (not owner, private, system-locked)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
