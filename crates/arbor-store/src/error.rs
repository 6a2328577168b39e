use arbor_types::ObjectId;

use crate::object::ObjectKind;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The object exists but has a different kind than requested.
    #[error("object {id} is a {actual}, expected a {expected}")]
    KindMismatch {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// A tree failed structural validation before being written.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ref not found: {name}")]
    RefNotFound { name: String },

    /// A non-forced write targeted a reference that already exists.
    #[error("ref already exists: {name}")]
    RefExists { name: String },

    /// A conditional update found a different current value.
    #[error("ref {name} moved: expected {expected:?}, found {actual:?}")]
    RefMoved {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    /// The storage backend failed or is unavailable.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
