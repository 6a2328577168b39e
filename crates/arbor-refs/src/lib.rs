//! Reference management for Arbor.
//!
//! References are the only mutable state in an Arbor repository. This crate
//! owns the rules for changing them:
//!
//! - [`cas`] -- the optimistic concurrency controller. Every committing
//!   operation reads the branch tip up front and passes it, unchanged, to
//!   [`compare_and_swap_ref`] as its very last step.
//! - [`branch`] -- create, delete and list branches under `refs/heads/`.
//! - [`names`] -- git-style branch name validation.

pub mod branch;
pub mod cas;
pub mod error;
pub mod names;

pub use branch::{
    branch_ref_name, create_branch, delete_branch, list_branches, BranchInfo, BRANCH_PREFIX,
};
pub use cas::compare_and_swap_ref;
pub use error::{RefError, Result};
pub use names::validate_branch_name;
