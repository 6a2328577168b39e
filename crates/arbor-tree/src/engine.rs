//! Path-directed operations over immutable trees.
//!
//! Mutations load the chain of trees from the root down to the target's
//! parent, change the bottom one, then write each level back up with the
//! child's new id. Only trees on the path are read or written.

use arbor_store::{EntryKind, EntryMode, ObjectStore, Tree, TreeEntry};
use arbor_types::ObjectId;
use tracing::debug;

use crate::error::{Result, TreeError};
use crate::path::RepoPath;
use crate::state::TreeState;

/// What a path resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub object_id: ObjectId,
    pub mode: EntryMode,
    pub kind: EntryKind,
}

/// Walk `segments` from `root`. An empty slice resolves to the root itself.
pub async fn resolve(
    store: &dyn ObjectStore,
    root: &TreeState,
    segments: &[String],
) -> Result<ResolvedEntry> {
    let not_found = || TreeError::NotFound {
        path: segments.join("/"),
    };
    let Some(root_id) = root.id() else {
        return Err(not_found());
    };

    let mut current = ResolvedEntry {
        object_id: root_id,
        mode: EntryMode::Directory,
        kind: EntryKind::Tree,
    };
    for segment in segments {
        if current.kind != EntryKind::Tree {
            return Err(not_found());
        }
        let tree = store.read_tree(&current.object_id).await?;
        let entry = tree.get(segment).ok_or_else(not_found)?;
        current = ResolvedEntry {
            object_id: entry.object_id,
            mode: entry.mode,
            kind: entry.kind(),
        };
    }
    Ok(current)
}

/// Entries of the directory at `segments`, in name order.
pub async fn list(
    store: &dyn ObjectStore,
    root: &TreeState,
    segments: &[String],
) -> Result<Vec<TreeEntry>> {
    if segments.is_empty() {
        if let TreeState::Absent = root {
            return Err(TreeError::NotFound { path: String::new() });
        }
        return Ok(root.read(store).await?.entries);
    }
    let resolved = resolve(store, root, segments).await?;
    if resolved.kind != EntryKind::Tree {
        return Err(TreeError::NotADirectory {
            path: segments.join("/"),
        });
    }
    Ok(store.read_tree(&resolved.object_id).await?.entries)
}

/// Point `path` at `blob` as a regular file and return the new root.
///
/// Whatever was at `path` is overwritten. Missing directories are created; a
/// file standing where a directory is needed is replaced by that directory.
pub async fn upsert(
    store: &dyn ObjectStore,
    root: &TreeState,
    path: &RepoPath,
    blob: ObjectId,
) -> Result<ObjectId> {
    upsert_with_mode(store, root, path, blob, EntryMode::Regular).await
}

/// [`upsert`] with an explicit file mode.
pub async fn upsert_with_mode(
    store: &dyn ObjectStore,
    root: &TreeState,
    path: &RepoPath,
    blob: ObjectId,
    mode: EntryMode,
) -> Result<ObjectId> {
    if mode.kind() != EntryKind::Blob {
        return Err(TreeError::InvalidLeafMode {
            path: path.to_string(),
        });
    }
    let segments = path.segments();

    // levels[i] holds the entry for segments[i].
    let mut levels: Vec<Tree> = Vec::with_capacity(segments.len());
    let mut next = root.read(store).await?;
    for segment in &segments[..segments.len() - 1] {
        let child = match next.get(segment) {
            Some(entry) if entry.is_tree() => store.read_tree(&entry.object_id).await?,
            _ => Tree::empty(),
        };
        levels.push(std::mem::replace(&mut next, child));
    }
    levels.push(next);

    let mut entry = TreeEntry::new(mode, path.file_name(), blob);
    let mut new_id = None;
    for (depth, mut tree) in levels.into_iter().enumerate().rev() {
        tree.upsert(entry);
        let id = store.write_tree(&tree).await?;
        new_id = Some(id);
        entry = TreeEntry::directory(segments[depth.saturating_sub(1)].clone(), id);
    }

    let root_id = new_id.ok_or_else(|| TreeError::NotFound {
        path: path.to_string(),
    })?;
    debug!(path = %path, blob = %blob.short_hex(), root = %root_id.short_hex(), "upserted");
    Ok(root_id)
}

/// Remove the file or directory at `path`.
///
/// Directories left empty are dropped from their parents rather than written;
/// if the root itself empties the result is [`TreeState::Absent`].
pub async fn remove(
    store: &dyn ObjectStore,
    root: &TreeState,
    path: &RepoPath,
) -> Result<TreeState> {
    let not_found = || TreeError::NotFound {
        path: path.to_string(),
    };
    let TreeState::NonEmpty(root_id) = root else {
        return Err(not_found());
    };
    let segments = path.segments();

    let mut levels: Vec<Tree> = Vec::with_capacity(segments.len());
    let mut current = *root_id;
    for (depth, segment) in segments.iter().enumerate() {
        let tree = store.read_tree(&current).await?;
        let entry = tree.get(segment).ok_or_else(not_found)?;
        if depth + 1 < segments.len() {
            if !entry.is_tree() {
                return Err(not_found());
            }
            current = entry.object_id;
        }
        levels.push(tree);
    }

    // `None` while the child at this level has been removed or pruned.
    let mut replacement: Option<ObjectId> = None;
    for (depth, mut tree) in levels.into_iter().enumerate().rev() {
        let name = &segments[depth];
        match replacement {
            None => {
                tree.remove(name);
            }
            Some(id) => tree.upsert(TreeEntry::directory(name.clone(), id)),
        }
        replacement = if tree.is_empty() {
            None
        } else {
            Some(store.write_tree(&tree).await?)
        };
    }

    let result = match replacement {
        Some(id) => TreeState::NonEmpty(id),
        None => TreeState::Absent,
    };
    debug!(path = %path, root = ?result.id().map(|id| id.short_hex()), "removed");
    Ok(result)
}

/// Count every file reachable from `root`.
pub async fn count_leaves(store: &dyn ObjectStore, root: &TreeState) -> Result<u64> {
    let TreeState::NonEmpty(root_id) = root else {
        return Ok(0);
    };
    let mut count = 0u64;
    let mut pending = vec![*root_id];
    while let Some(id) = pending.pop() {
        for entry in store.read_tree(&id).await?.entries {
            match entry.kind() {
                EntryKind::Blob => count += 1,
                EntryKind::Tree => pending.push(entry.object_id),
            }
        }
    }
    Ok(count)
}
