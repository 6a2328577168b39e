use arbor_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    /// A segment is missing, or a non-terminal segment is a file.
    #[error("path not found: {path}")]
    NotFound { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// Leaves written by upsert must be file modes.
    #[error("cannot write a directory mode at leaf {path}")]
    InvalidLeafMode { path: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, TreeError>;
