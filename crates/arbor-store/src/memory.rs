use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use arbor_types::ObjectId;
use async_trait::async_trait;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, Commit, StoredObject, Tree};
use crate::traits::ObjectStore;

/// In-memory object store with a reference namespace.
///
/// Intended for tests and embedding. Objects and refs live in maps behind
/// `RwLock`s; reads clone out of the map. Conditional ref updates hold the
/// ref write lock across the compare and the write.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, Entry>>,
    refs: RwLock<BTreeMap<String, ObjectId>>,
}

/// A stored object and the last time it was written.
pub(crate) struct Entry {
    pub(crate) object: StoredObject,
    pub(crate) written_at: Instant,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            refs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.objects_read()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.objects_read()?.is_empty())
    }

    pub fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.objects_read()?.contains_key(id))
    }

    pub(crate) fn objects_read(
        &self,
    ) -> StoreResult<RwLockReadGuard<'_, HashMap<ObjectId, Entry>>> {
        self.objects
            .read()
            .map_err(|e| StoreError::Backend(format!("object lock poisoned: {e}")))
    }

    pub(crate) fn objects_write(
        &self,
    ) -> StoreResult<RwLockWriteGuard<'_, HashMap<ObjectId, Entry>>> {
        self.objects
            .write()
            .map_err(|e| StoreError::Backend(format!("object lock poisoned: {e}")))
    }

    pub(crate) fn refs_read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, ObjectId>>> {
        self.refs
            .read()
            .map_err(|e| StoreError::Backend(format!("ref lock poisoned: {e}")))
    }

    fn refs_write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, ObjectId>>> {
        self.refs
            .write()
            .map_err(|e| StoreError::Backend(format!("ref lock poisoned: {e}")))
    }

    fn get(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.objects_read()?
            .get(id)
            .map(|entry| entry.object.clone())
            .ok_or(StoreError::NotFound(*id))
    }

    fn put(&self, object: StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let now = Instant::now();
        // A repeated write keeps the stored bytes but refreshes the write
        // time, so garbage collection treats the object as fresh again.
        self.objects_write()?
            .entry(id)
            .and_modify(|entry| entry.written_at = now)
            .or_insert(Entry {
                object,
                written_at: now,
            });
        Ok(id)
    }

    fn commit_parents(&self, id: &ObjectId) -> StoreResult<Vec<ObjectId>> {
        Ok(Commit::from_stored_object(&self.get(id)?)?.parents)
    }

    /// Every commit reachable from `start`, including `start` itself.
    fn ancestry(&self, start: &ObjectId) -> StoreResult<HashSet<ObjectId>> {
        let mut visited = HashSet::from([*start]);
        let mut queue = VecDeque::from([*start]);
        while let Some(current) = queue.pop_front() {
            for parent in self.commit_parents(&current)? {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(visited)
    }

    fn merge_base_sync(&self, a: &ObjectId, b: &ObjectId) -> StoreResult<Option<ObjectId>> {
        if a == b {
            return Ok(Some(*a));
        }
        let ancestors_a = self.ancestry(a)?;

        // Walk b's history breadth-first, stopping at the first common
        // commits on each path. Those are the merge base candidates.
        let mut candidates = Vec::new();
        let mut visited = HashSet::from([*b]);
        let mut queue = VecDeque::from([*b]);
        while let Some(current) = queue.pop_front() {
            if ancestors_a.contains(&current) {
                candidates.push(current);
                continue;
            }
            for parent in self.commit_parents(&current)? {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        // Drop candidates that are ancestors of another candidate; the first
        // remaining one in visit order is the nearest.
        let mut best = None;
        for candidate in &candidates {
            let mut dominated = false;
            for other in &candidates {
                if other != candidate && self.ancestry(other)?.contains(candidate) {
                    dominated = true;
                    break;
                }
            }
            if !dominated {
                best = Some(*candidate);
                break;
            }
        }
        Ok(best)
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        Ok(Blob::from_stored_object(&self.get(id)?)?.data)
    }

    async fn write_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
        self.put(Blob::new(data.to_vec()).into_stored_object())
    }

    async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        Tree::from_stored_object(&self.get(id)?)
    }

    async fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
        if tree.is_empty() {
            return Err(StoreError::InvalidTree(
                "refusing to write an empty tree entry list".into(),
            ));
        }
        tree.validate()?;
        self.put(tree.to_stored_object()?)
    }

    async fn empty_tree(&self) -> StoreResult<ObjectId> {
        self.put(Tree::empty().to_stored_object()?)
    }

    async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        Commit::from_stored_object(&self.get(id)?)
    }

    async fn write_commit(&self, commit: &Commit) -> StoreResult<ObjectId> {
        self.put(commit.to_stored_object()?)
    }

    async fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId> {
        self.refs_read()?
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::RefNotFound { name: name.into() })
    }

    async fn write_ref(&self, name: &str, id: ObjectId, force: bool) -> StoreResult<()> {
        let mut refs = self.refs_write()?;
        if !force && refs.contains_key(name) {
            return Err(StoreError::RefExists { name: name.into() });
        }
        refs.insert(name.to_string(), id);
        debug!(name, target = %id.short_hex(), force, "ref written");
        Ok(())
    }

    async fn update_ref(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> StoreResult<()> {
        let mut refs = self.refs_write()?;
        let actual = refs.get(name).copied();
        if actual != expected {
            return Err(StoreError::RefMoved {
                name: name.into(),
                expected,
                actual,
            });
        }
        refs.insert(name.to_string(), new);
        debug!(name, target = %new.short_hex(), "ref advanced");
        Ok(())
    }

    async fn delete_ref(&self, name: &str) -> StoreResult<()> {
        self.refs_write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::RefNotFound { name: name.into() })
    }

    async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>> {
        // BTreeMap iteration is already sorted by name.
        Ok(self
            .refs_read()?
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }

    async fn find_merge_base(&self, a: &ObjectId, b: &ObjectId) -> StoreResult<Option<ObjectId>> {
        self.merge_base_sync(a, b)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let objects = self.objects.read().map(|m| m.len()).unwrap_or_default();
        let refs = self.refs.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &objects)
            .field("ref_count", &refs)
            .finish()
    }
}
