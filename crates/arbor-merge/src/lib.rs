//! Three-way merge engine for Arbor.
//!
//! Merges two trees against their common base level by level. Entries that
//! only one side changed are taken from that side by id without descending;
//! directories both sides changed are merged recursively; anything else both
//! sides changed is a conflict, which the caller may settle up front by
//! supplying the resolved content for that path.

pub mod error;
pub mod merge;

pub use error::{MergeError, Result};
pub use merge::{merge_trees, MergeOutcome, Resolutions};
