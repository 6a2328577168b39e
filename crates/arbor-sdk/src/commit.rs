use arbor_store::Signature;
use arbor_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Per-operation commit metadata. Missing fields fall back to the
/// repository config and a message describing the operation.
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    pub message: Option<String>,
    pub author: Option<Signature>,
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    pub(crate) fn message_or(&self, fallback: impl FnOnce() -> String) -> String {
        self.message.clone().unwrap_or_else(fallback)
    }
}

/// One file of an add batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub content: Vec<u8>,
    pub executable: bool,
}

impl FileWrite {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            executable: false,
        }
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub commit: ObjectId,
    pub tree: ObjectId,
    /// Blob ids in input order.
    pub blobs: Vec<ObjectId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub commit: ObjectId,
    /// `None` when the removal emptied the repository; the commit then
    /// points at the canonical empty tree.
    pub tree: Option<ObjectId>,
    /// Number of files removed.
    pub removed: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    /// The merge commit, or the unchanged destination tip when up to date.
    pub commit: ObjectId,
    pub tree: ObjectId,
    /// Paths left unresolved by a partial resolution map.
    pub conflicts: Option<Vec<String>>,
    pub up_to_date: bool,
}
