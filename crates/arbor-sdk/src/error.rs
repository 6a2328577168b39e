//! The flat error taxonomy every [`Repository`](crate::Repository) operation
//! returns.

use arbor_merge::MergeError;
use arbor_refs::RefError;
use arbor_store::StoreError;
use arbor_tree::{PathError, TreeError};
use arbor_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A path, branch or reference does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The reference moved between reading its tip and advancing it.
    #[error("concurrent update of {reference}: expected {expected:?}, found {actual:?}")]
    ConcurrencyConflict {
        reference: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    #[error("merge conflict in: {}", .paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    #[error("already exists: {name}")]
    AlreadyExists { name: String },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid reference {name:?}: {reason}")]
    InvalidReference { name: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("binary file: {path}")]
    BinaryFile { path: String },

    /// An underlying store failure, tagged with the public operation name.
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
}

impl Error {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: String::new(),
            message: message.into(),
        }
    }

    /// Tag an [`Error::OperationFailed`] with the operation it escaped from.
    /// Every other kind passes through unchanged.
    pub(crate) fn during(self, operation: &str) -> Self {
        match self {
            Self::OperationFailed { message, .. } => Self::OperationFailed {
                operation: operation.to_string(),
                message,
            },
            other => other,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RefNotFound { name } => Self::NotFound {
                what: format!("reference {name}"),
            },
            StoreError::RefExists { name } => Self::AlreadyExists { name },
            StoreError::RefMoved {
                name,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                reference: name,
                expected,
                actual,
            },
            other => Self::failed(other.to_string()),
        }
    }
}

impl From<RefError> for Error {
    fn from(err: RefError) -> Self {
        match err {
            RefError::NotFound { name } => Self::NotFound {
                what: format!("branch {name}"),
            },
            RefError::AlreadyExists { name } => Self::AlreadyExists { name },
            RefError::InvalidBranchName { name, reason } => Self::InvalidReference { name, reason },
            RefError::InvalidTarget { name, reason, .. } => Self::InvalidReference { name, reason },
            RefError::ConcurrencyConflict {
                name,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                reference: name,
                expected,
                actual,
            },
            RefError::Store(e) => e.into(),
        }
    }
}

impl From<TreeError> for Error {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound { path } => Self::NotFound { what: path },
            TreeError::NotADirectory { path } => {
                Self::InvalidInput(format!("{path} is not a directory"))
            }
            TreeError::InvalidLeafMode { path } => {
                Self::InvalidInput(format!("{path} needs a file mode"))
            }
            TreeError::Store(e) => e.into(),
        }
    }
}

impl From<MergeError> for Error {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Conflict { paths } => Self::MergeConflict { paths },
            MergeError::Store(e) => e.into(),
        }
    }
}

impl From<PathError> for Error {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Invalid { path, reason } => Self::InvalidPath { path, reason },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
