use arbor_types::ObjectId;
use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::object::{Commit, Tree};

/// Content-addressed object store plus reference namespace.
///
/// This is the whole surface Arbor's engines depend on. Every method is a
/// suspension point; nothing else in the engines blocks.
///
/// Implementations must satisfy these invariants:
/// - Object writes are idempotent: identical content yields the identical id.
/// - Reads reflect the latest committed state at call time.
/// - [`update_ref`](Self::update_ref) checks and writes atomically.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    async fn write_blob(&self, data: &[u8]) -> StoreResult<ObjectId>;

    async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree>;

    /// Write a non-empty tree. Empty trees are rejected with
    /// [`StoreError::InvalidTree`]; use [`empty_tree`](Self::empty_tree).
    async fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId>;

    /// Write (or look up) the canonical empty tree and return its id.
    async fn empty_tree(&self) -> StoreResult<ObjectId>;

    async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit>;

    async fn write_commit(&self, commit: &Commit) -> StoreResult<ObjectId>;

    /// Resolve a reference, failing with [`StoreError::RefNotFound`].
    async fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId>;

    /// Write a reference. Without `force`, an existing reference is an error
    /// ([`StoreError::RefExists`]).
    async fn write_ref(&self, name: &str, id: ObjectId, force: bool) -> StoreResult<()>;

    /// Atomically set `name` to `new` only if its current value equals
    /// `expected` (`None` meaning "must not exist"). Fails with
    /// [`StoreError::RefMoved`] otherwise, leaving the reference untouched.
    async fn update_ref(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> StoreResult<()>;

    /// Delete a reference, failing with [`StoreError::RefNotFound`].
    async fn delete_ref(&self, name: &str) -> StoreResult<()>;

    /// All references whose name starts with `prefix`, sorted by name.
    async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>>;

    /// Nearest common ancestor of two commits, or `None` for disjoint
    /// histories.
    async fn find_merge_base(&self, a: &ObjectId, b: &ObjectId) -> StoreResult<Option<ObjectId>>;

    /// Like [`resolve_ref`](Self::resolve_ref) but maps a missing reference
    /// to `None`.
    async fn read_ref(&self, name: &str) -> StoreResult<Option<ObjectId>> {
        match self.resolve_ref(name).await {
            Ok(id) => Ok(Some(id)),
            Err(StoreError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
