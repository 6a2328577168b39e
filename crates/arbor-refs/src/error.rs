//! Error types for reference operations.

use arbor_store::StoreError;
use arbor_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefError {
    #[error("ref not found: {name}")]
    NotFound { name: String },

    #[error("ref already exists: {name}")]
    AlreadyExists { name: String },

    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// A branch was pointed at something other than a stored commit.
    #[error("branch {name} cannot target {}: {reason}", .target.short_hex())]
    InvalidTarget {
        name: String,
        target: ObjectId,
        reason: String,
    },

    /// The reference moved between reading the expected tip and the update.
    #[error("ref {name} moved: expected {expected:?}, found {actual:?}")]
    ConcurrencyConflict {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    /// Any other object store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RefError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RefNotFound { name } => Self::NotFound { name },
            StoreError::RefExists { name } => Self::AlreadyExists { name },
            StoreError::RefMoved {
                name,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                name,
                expected,
                actual,
            },
            other => Self::Store(other),
        }
    }
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
