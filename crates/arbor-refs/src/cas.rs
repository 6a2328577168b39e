//! The optimistic concurrency controller.
//!
//! Objects are append-only and immutable, so nothing in Arbor locks trees or
//! blobs. The single serialization point is the reference update below:
//! single-writer-wins per reference, no queuing and no retry. A losing writer
//! has already written its commit; that commit is unreachable until the
//! caller retries the whole logical operation against the new tip.

use arbor_store::ObjectStore;
use arbor_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{RefError, Result};

/// Advance `name` from `expected` to `new`.
///
/// `expected` is the tip the caller read before computing its change
/// (`None` if the reference did not exist). If the current value differs,
/// fails with [`RefError::ConcurrencyConflict`] and leaves the reference
/// untouched. The final write goes through [`ObjectStore::update_ref`], which
/// re-checks under the store's own lock, so a writer racing in between still
/// loses.
pub async fn compare_and_swap_ref(
    store: &dyn ObjectStore,
    name: &str,
    expected: Option<ObjectId>,
    new: ObjectId,
) -> Result<()> {
    let actual = store.read_ref(name).await?;
    if actual != expected {
        warn!(
            reference = name,
            expected = ?expected.map(|id| id.short_hex()),
            actual = ?actual.map(|id| id.short_hex()),
            "ref moved before update"
        );
        return Err(RefError::ConcurrencyConflict {
            name: name.to_string(),
            expected,
            actual,
        });
    }

    store.update_ref(name, expected, new).await.map_err(|e| {
        let err = RefError::from(e);
        if matches!(err, RefError::ConcurrencyConflict { .. }) {
            warn!(reference = name, "ref moved during update");
        }
        err
    })?;
    debug!(reference = name, new = %new.short_hex(), "compare-and-swap succeeded");
    Ok(())
}
