use arbor_store::{ObjectStore, StoreResult, Tree};
use arbor_types::ObjectId;

/// The root a tree operation starts from or produces.
///
/// Engines never write zero-entry trees, so a mutation that empties a tree
/// yields [`TreeState::Absent`]. A stored zero-entry tree only appears as the
/// canonical empty tree a commit points at, which is [`TreeState::Empty`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TreeState {
    /// No tree: everything was pruned away, or nothing was ever written.
    Absent,
    /// A stored tree with no entries.
    Empty(ObjectId),
    /// A stored tree with at least one entry.
    NonEmpty(ObjectId),
}

impl TreeState {
    /// Classify a tree that has already been read.
    pub fn of(id: ObjectId, tree: &Tree) -> Self {
        if tree.is_empty() {
            Self::Empty(id)
        } else {
            Self::NonEmpty(id)
        }
    }

    /// Read the tree `id` and classify it.
    pub async fn load(store: &dyn ObjectStore, id: ObjectId) -> StoreResult<Self> {
        let tree = store.read_tree(&id).await?;
        Ok(Self::of(id, &tree))
    }

    /// The stored tree id, if any.
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            Self::Absent => None,
            Self::Empty(id) | Self::NonEmpty(id) => Some(*id),
        }
    }

    /// Whether the root holds no entries, stored or not.
    pub fn is_empty(&self) -> bool {
        !matches!(self, Self::NonEmpty(_))
    }

    /// The tree a commit should point at. An absent root becomes the
    /// canonical empty tree.
    pub async fn commit_tree(&self, store: &dyn ObjectStore) -> StoreResult<ObjectId> {
        match self {
            Self::Absent => store.empty_tree().await,
            Self::Empty(id) | Self::NonEmpty(id) => Ok(*id),
        }
    }

    /// The entries of this root; empty for `Absent` and `Empty` without a read.
    pub(crate) async fn read(&self, store: &dyn ObjectStore) -> StoreResult<Tree> {
        match self {
            Self::NonEmpty(id) => store.read_tree(id).await,
            Self::Absent | Self::Empty(_) => Ok(Tree::empty()),
        }
    }
}
