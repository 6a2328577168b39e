use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

use arbor_store::{EntryMode, ObjectStore, Tree, TreeEntry};
use arbor_tree::TreeState;
use arbor_types::ObjectId;
use tracing::debug;

use crate::error::{MergeError, Result};

/// Resolved file content keyed by normalized path (`src/lib.rs`).
pub type Resolutions = BTreeMap<String, Vec<u8>>;

/// The merged tree plus any conflicts left unresolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    pub tree: TreeState,
    /// Full paths of conflicted entries, omitted from `tree`.
    pub conflicts: Vec<String>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

type LevelFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<ObjectId>>> + Send + 'a>>;

/// Merge `ours` and `theirs` against `base`. A `None` tree has no entries.
///
/// Without `resolutions`, any conflict fails the merge with
/// [`MergeError::Conflict`]. With a map, even a partial one, conflicts it
/// does not cover are reported in the outcome and left out of the tree.
pub async fn merge_trees(
    store: &dyn ObjectStore,
    base: Option<ObjectId>,
    ours: Option<ObjectId>,
    theirs: Option<ObjectId>,
    resolutions: Option<&Resolutions>,
) -> Result<MergeOutcome> {
    let mut conflicts = Vec::new();
    let merged = if ours == theirs || base == theirs {
        ours
    } else if base == ours {
        theirs
    } else {
        merge_level(store, base, ours, theirs, String::new(), resolutions, &mut conflicts).await?
    };

    if !conflicts.is_empty() && resolutions.is_none() {
        debug!(count = conflicts.len(), "merge has unresolved conflicts");
        return Err(MergeError::Conflict { paths: conflicts });
    }

    let tree = match merged {
        Some(id) => TreeState::load(store, id).await?,
        None => TreeState::Absent,
    };
    debug!(
        tree = ?tree.id().map(|id| id.short_hex()),
        conflicts = conflicts.len(),
        "trees merged"
    );
    Ok(MergeOutcome { tree, conflicts })
}

/// Compare by content and mode.
fn same(a: Option<&TreeEntry>, b: Option<&TreeEntry>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.object_id == b.object_id && a.mode == b.mode,
        _ => false,
    }
}

fn is_directory_or_absent(entry: Option<&TreeEntry>) -> bool {
    entry.map_or(true, TreeEntry::is_tree)
}

fn subtree(entry: Option<&TreeEntry>) -> Option<ObjectId> {
    entry.filter(|e| e.is_tree()).map(|e| e.object_id)
}

async fn read_level(store: &dyn ObjectStore, id: Option<ObjectId>) -> Result<Tree> {
    match id {
        Some(id) => Ok(store.read_tree(&id).await?),
        None => Ok(Tree::empty()),
    }
}

fn merge_level<'a>(
    store: &'a dyn ObjectStore,
    base: Option<ObjectId>,
    ours: Option<ObjectId>,
    theirs: Option<ObjectId>,
    prefix: String,
    resolutions: Option<&'a Resolutions>,
    conflicts: &'a mut Vec<String>,
) -> LevelFuture<'a> {
    Box::pin(async move {
        let base_tree = read_level(store, base).await?;
        let ours_tree = read_level(store, ours).await?;
        let theirs_tree = read_level(store, theirs).await?;

        let names: BTreeSet<&str> = base_tree
            .entries
            .iter()
            .chain(&ours_tree.entries)
            .chain(&theirs_tree.entries)
            .map(|e| e.name.as_str())
            .collect();

        let mut merged = Vec::with_capacity(names.len());
        for name in names {
            let b = base_tree.get(name);
            let o = ours_tree.get(name);
            let t = theirs_tree.get(name);

            if same(o, t) || same(t, b) {
                merged.extend(o.cloned());
                continue;
            }
            if same(o, b) {
                merged.extend(t.cloned());
                continue;
            }

            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };

            if is_directory_or_absent(o) && is_directory_or_absent(t) {
                let child = merge_level(
                    store,
                    subtree(b),
                    subtree(o),
                    subtree(t),
                    path,
                    resolutions,
                    &mut *conflicts,
                )
                .await?;
                if let Some(id) = child {
                    merged.push(TreeEntry::directory(name, id));
                }
                continue;
            }

            match resolutions.and_then(|r| r.get(&path)) {
                Some(content) => {
                    let blob = store.write_blob(content).await?;
                    let mode = match o {
                        Some(entry) if entry.mode == EntryMode::Executable => EntryMode::Executable,
                        _ => EntryMode::Regular,
                    };
                    debug!(path = %path, blob = %blob.short_hex(), "conflict resolved");
                    merged.push(TreeEntry::new(mode, name, blob));
                }
                None => {
                    debug!(path = %path, "conflict");
                    conflicts.push(path);
                }
            }
        }

        if merged.is_empty() {
            return Ok(None);
        }
        Ok(Some(store.write_tree(&Tree::new(merged)).await?))
    })
}
