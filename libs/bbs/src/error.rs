//! Bulletin board error types.

use bbs_models::ModelError;
use bbs_store::StoreError;
use thiserror::Error;

/// Result type for bulletin board operations.
pub type BbsResult<T> = Result<T, BbsError>;

/// Errors surfaced to callers of the bulletin board.
#[derive(Debug, Error)]
pub enum BbsError {
    /// The caller supplied a structurally invalid argument.
    #[error("invalid parameter: {field}")]
    InvalidParameter { field: &'static str },

    /// A lookup by exact key found nothing.
    #[error("resource not found: {key}")]
    ResourceNotFound { key: String },

    /// The bytes stored under a key do not form a valid record.
    #[error("invalid record at {key}: {source}")]
    InvalidRecord {
        key: String,
        #[source]
        source: ModelError,
    },

    /// The cell inventory could not be read.
    #[error("failed to load cells: {0}")]
    CellsLoad(String),

    /// The store failed for infrastructure reasons.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl BbsError {
    /// Map a store error from an exact-key lookup.
    pub(crate) fn from_lookup(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(key) => BbsError::ResourceNotFound { key },
            other => BbsError::Store(other),
        }
    }

    /// Returns true if this error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BbsError::ResourceNotFound { .. })
    }
}
