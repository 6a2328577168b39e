use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use arbor_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// A stored object: kind tag plus encoded bytes.
///
/// Backends persist `StoredObject`s keyed by [`StoredObject::compute_id`] and
/// never look inside `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Compute the content-addressed id using the kind's hash domain.
    pub fn compute_id(&self) -> ObjectId {
        let hasher = match self.kind {
            ObjectKind::Blob => &ContentHasher::BLOB,
            ObjectKind::Tree => &ContentHasher::TREE,
            ObjectKind::Commit => &ContentHasher::COMMIT,
        };
        hasher.hash(&self.data)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn expect_kind(&self, expected: ObjectKind) -> StoreResult<()> {
        if self.kind != expected {
            return Err(StoreError::KindMismatch {
                id: self.compute_id(),
                expected,
                actual: self.kind,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw file content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn into_stored_object(self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data)
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Blob)?;
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Subtree / directory (0o040000).
    Directory,
}

impl EntryMode {
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Directory => 0o040000,
        }
    }

    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o040000 => Some(Self::Directory),
            _ => None,
        }
    }

    /// The object kind an entry with this mode points at.
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Directory => EntryKind::Tree,
            Self::Regular | Self::Executable => EntryKind::Blob,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// What a tree entry points at. Exactly two variants: files and directories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Blob,
    Tree,
}

/// A single named entry in a tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub object_id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }

    pub fn blob(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(EntryMode::Regular, name, object_id)
    }

    pub fn directory(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(EntryMode::Directory, name, object_id)
    }

    pub fn kind(&self) -> EntryKind {
        self.mode.kind()
    }

    pub fn is_tree(&self) -> bool {
        self.kind() == EntryKind::Tree
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Directory listing. Entries are kept sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a tree, sorting entries by name for deterministic hashing.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Insert an entry, replacing any existing entry with the same name.
    pub fn upsert(&mut self, entry: TreeEntry) {
        match self
            .entries
            .binary_search_by(|e| e.name.as_str().cmp(&entry.name))
        {
            Ok(idx) => self.entries[idx] = entry,
            Err(idx) => self.entries.insert(idx, entry),
        }
    }

    /// Remove the entry named `name`, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.entries.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the structural invariants every persisted tree must hold:
    /// entries sorted, names non-empty, slash-free and unique.
    pub fn validate(&self) -> StoreResult<()> {
        for entry in &self.entries {
            if entry.name.is_empty() || entry.name.contains('/') || entry.name.contains('\0') {
                return Err(StoreError::InvalidTree(format!(
                    "invalid entry name {:?}",
                    entry.name
                )));
            }
        }
        for pair in self.entries.windows(2) {
            if pair[0].name >= pair[1].name {
                return Err(StoreError::InvalidTree(format!(
                    "duplicate or unsorted entry {:?}",
                    pair[1].name
                )));
            }
        }
        Ok(())
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Tree, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Tree)?;
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Authorship stamp on a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// Signature stamped with the current time.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::new(name, email, Utc::now())
    }
}

/// A named snapshot: root tree plus ordered parents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    /// Zero parents for a root commit, one for a linear commit, two for a merge.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Commit, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Commit)?;
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
