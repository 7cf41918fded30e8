//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live key at this path.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A live key already exists at this path.
    #[error("key already exists: {0}")]
    KeyExists(String),

    /// The current value did not match the expected one.
    #[error("value comparison failed for key: {0}")]
    ComparisonFailed(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Returns true if the key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound(_))
    }

    /// Returns true if this is an infrastructure failure rather than a
    /// precondition outcome.
    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Sqlite(_))
    }
}
