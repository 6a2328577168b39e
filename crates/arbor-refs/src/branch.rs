//! Branches: references under `refs/heads/`.

use arbor_store::{ObjectStore, StoreError};
use arbor_types::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RefError, Result};
use crate::names::validate_branch_name;

/// Namespace prefix for branch references.
pub const BRANCH_PREFIX: &str = "refs/heads/";

/// Full reference name for a short branch name.
pub fn branch_ref_name(name: &str) -> String {
    format!("{BRANCH_PREFIX}{name}")
}

/// A branch and the commit it currently points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Short name, without the `refs/heads/` prefix.
    pub name: String,
    pub commit: ObjectId,
}

/// Create branch `name` at `target`.
///
/// Without `force` an existing branch is [`RefError::AlreadyExists`]; with it
/// the branch is moved unconditionally.
pub async fn create_branch(
    store: &dyn ObjectStore,
    name: &str,
    target: ObjectId,
    force: bool,
) -> Result<BranchInfo> {
    validate_branch_name(name)?;
    store
        .read_commit(&target)
        .await
        .map_err(|e| match e {
            StoreError::NotFound(_) | StoreError::KindMismatch { .. } => RefError::InvalidTarget {
                name: name.to_string(),
                target,
                reason: e.to_string(),
            },
            other => other.into(),
        })?;

    store.write_ref(&branch_ref_name(name), target, force).await?;
    info!(branch = name, target = %target.short_hex(), force, "branch created");
    Ok(BranchInfo {
        name: name.to_string(),
        commit: target,
    })
}

/// Delete branch `name`. A missing branch is [`RefError::NotFound`].
///
/// Commits only reachable from the deleted branch stay in the store until a
/// garbage collection pass.
pub async fn delete_branch(store: &dyn ObjectStore, name: &str) -> Result<()> {
    validate_branch_name(name)?;
    store
        .delete_ref(&branch_ref_name(name))
        .await
        .map_err(|e| match RefError::from(e) {
            RefError::NotFound { .. } => RefError::NotFound {
                name: name.to_string(),
            },
            other => other,
        })?;
    info!(branch = name, "branch deleted");
    Ok(())
}

/// All branches, sorted by name.
pub async fn list_branches(store: &dyn ObjectStore) -> Result<Vec<BranchInfo>> {
    let refs = store.list_refs(BRANCH_PREFIX).await?;
    let branches: Vec<BranchInfo> = refs
        .into_iter()
        .filter_map(|(full, commit)| {
            full.strip_prefix(BRANCH_PREFIX).map(|short| BranchInfo {
                name: short.to_string(),
                commit,
            })
        })
        .collect();
    debug!(count = branches.len(), "listed branches");
    Ok(branches)
}
