//! Content-addressed object storage for Arbor.
//!
//! The store holds three immutable object kinds plus one mutable namespace:
//!
//! - [`Blob`] -- raw file content
//! - [`Tree`] -- sorted directory listing of [`TreeEntry`] values
//! - [`Commit`] -- a tree snapshot with parents and authorship
//! - references -- named pointers to commits, the only mutable state
//!
//! Arbor's engines consume storage exclusively through the async
//! [`ObjectStore`] trait. [`InMemoryObjectStore`] is the bundled backend for
//! tests and embedding; it also exposes the out-of-band [`Maintenance`]
//! capability.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written. The same content always yields the
//!    same id and repeated writes are no-ops.
//! 2. Reference updates are the only mutation; conditional updates are atomic.
//! 3. Reads always reflect the latest state; there is no caching layer.
//! 4. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod hasher;
pub mod maintenance;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use hasher::ContentHasher;
pub use maintenance::{GcOptions, GcReport, Maintenance, DEFAULT_GC_GRACE};
pub use memory::InMemoryObjectStore;
pub use object::{
    Blob, Commit, EntryKind, EntryMode, ObjectKind, Signature, StoredObject, Tree, TreeEntry,
};
pub use traits::ObjectStore;
