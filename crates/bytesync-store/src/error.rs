//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stack, version or block not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional write did not match the stored state, or a unique key
    /// already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Backend failure outside the database itself (poisoned lock, task join).
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this is a stale-position rejection that the caller may retry
    /// after resynchronising.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Whether the addressed record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
