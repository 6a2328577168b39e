use arbor_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    /// Both sides changed these paths and no resolutions were supplied.
    #[error("merge conflict in {} path(s): {}", .paths.len(), .paths.join(", "))]
    Conflict { paths: Vec<String> },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MergeError>;
