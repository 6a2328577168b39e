//! Tree mutation engine for Arbor.
//!
//! Trees are immutable and content-addressed. Every mutation reads the trees
//! on the path from the root to the target, rebuilds exactly those, and
//! returns a new root. Entries off the path keep their ids, so two roots
//! produced from one another share every untouched subtree.
//!
//! - [`path`] normalizes user-supplied path strings into segments.
//! - [`state`] models a root that may be pruned away entirely.
//! - [`engine`] implements resolve, upsert, remove and leaf counting.

pub mod engine;
pub mod error;
pub mod path;
pub mod state;

pub use engine::{count_leaves, list, remove, resolve, upsert, upsert_with_mode, ResolvedEntry};
pub use error::{Result, TreeError};
pub use path::{PathError, RepoPath};
pub use state::TreeState;
