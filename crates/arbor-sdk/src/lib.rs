//! High-level SDK for Arbor.
//!
//! [`Repository`] is the entry point for applications embedding Arbor. Each
//! operation reads a branch tip, computes a new tree with the tree or merge
//! engine, writes a commit, and advances the branch with a compare-and-swap
//! against the tip it started from. An operation either completes with the
//! branch advanced or fails with a typed [`Error`] and leaves it untouched.

pub mod commit;
pub mod config;
pub mod content;
pub mod error;
pub mod repository;

pub use commit::{CommitOptions, FileWrite, MergeResult, RemoveResult, WriteResult};
pub use config::{ConfigError, RepositoryConfig};
pub use content::{Content, DirEntry, Encoding, FileContent};
pub use error::{Error, Result};
pub use repository::{RefSpec, Repository};

// Re-export key types
pub use arbor_refs::BranchInfo;
pub use arbor_store::{
    Commit, EntryKind, EntryMode, GcOptions, GcReport, InMemoryObjectStore, Maintenance,
    ObjectStore, Signature,
};
pub use arbor_types::ObjectId;
