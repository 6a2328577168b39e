//! Out-of-band store maintenance.
//!
//! Failed or lost compare-and-swap races leave unreferenced commits, trees
//! and blobs behind. Nothing in Arbor's engines calls into this module: an
//! embedder schedules [`Maintenance::collect_garbage`] independently, and the
//! engines stay correct whether or not it ever runs.
//!
//! An operation writes its blobs and trees before the commit that makes them
//! reachable. Unreachable objects younger than [`GcOptions::grace`] are
//! therefore kept, the same expiry rule `git prune` applies to loose objects.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use arbor_types::ObjectId;
use async_trait::async_trait;
use tracing::info;

use crate::error::StoreResult;
use crate::memory::{Entry, InMemoryObjectStore};
use crate::object::{Commit, ObjectKind, Tree};

/// Grace window applied by [`Maintenance::collect_garbage`].
pub const DEFAULT_GC_GRACE: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GcOptions {
    /// Unreachable objects written more recently than this survive the pass.
    pub grace: Duration,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GC_GRACE,
        }
    }
}

/// Statistics from a garbage collection run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcReport {
    pub retained: usize,
    pub collected: usize,
    pub total_before: usize,
    /// Unreachable objects kept because they are inside the grace window.
    pub deferred: usize,
    pub bytes_reclaimed: u64,
}

impl GcReport {
    pub fn did_collect(&self) -> bool {
        self.collected > 0
    }
}

/// A maintenance capability exposed by a store backend.
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Mark everything reachable from the reference namespace and sweep the
    /// unreachable objects older than `options.grace`.
    async fn collect_garbage_with(&self, options: GcOptions) -> StoreResult<GcReport>;

    /// [`collect_garbage_with`](Self::collect_garbage_with) using
    /// [`DEFAULT_GC_GRACE`].
    async fn collect_garbage(&self) -> StoreResult<GcReport> {
        self.collect_garbage_with(GcOptions::default()).await
    }
}

#[async_trait]
impl Maintenance for InMemoryObjectStore {
    async fn collect_garbage_with(&self, options: GcOptions) -> StoreResult<GcReport> {
        let refs = self.refs_read()?;
        let mut objects = self.objects_write()?;
        let roots: Vec<ObjectId> = refs.values().copied().collect();
        let reachable = mark(&objects, &roots)?;

        let total_before = objects.len();
        let mut deferred = 0;
        let mut bytes_reclaimed = 0;
        objects.retain(|id, entry| {
            if reachable.contains(id) {
                return true;
            }
            if entry.written_at.elapsed() < options.grace {
                deferred += 1;
                return true;
            }
            bytes_reclaimed += entry.object.size();
            false
        });

        let report = GcReport {
            retained: objects.len(),
            collected: total_before - objects.len(),
            total_before,
            deferred,
            bytes_reclaimed,
        };
        info!(
            retained = report.retained,
            collected = report.collected,
            deferred = report.deferred,
            bytes = report.bytes_reclaimed,
            "garbage collection finished"
        );
        Ok(report)
    }
}

/// Walk commits, parents, trees and blobs from the given roots.
///
/// Ids missing from the store are skipped; a dangling ref is not this pass's
/// concern.
fn mark(objects: &HashMap<ObjectId, Entry>, roots: &[ObjectId]) -> StoreResult<HashSet<ObjectId>> {
    let mut reachable = HashSet::new();
    let mut stack: Vec<ObjectId> = roots.to_vec();

    while let Some(id) = stack.pop() {
        if !reachable.insert(id) {
            continue;
        }
        let Some(entry) = objects.get(&id) else {
            continue;
        };
        let object = &entry.object;
        match object.kind {
            ObjectKind::Commit => {
                let commit = Commit::from_stored_object(object)?;
                stack.push(commit.tree);
                stack.extend(commit.parents);
            }
            ObjectKind::Tree => {
                let tree = Tree::from_stored_object(object)?;
                stack.extend(tree.entries.into_iter().map(|e| e.object_id));
            }
            ObjectKind::Blob => {}
        }
    }
    Ok(reachable)
}
