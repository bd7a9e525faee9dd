//! Pure state transitions for the optimistic layer.
//!
//! Reconciliation and rollback are plain functions over (entities,
//! response / snapshot) so they can be tested without any transport.

use super::SyncEntity;

/// What a mutation must undo if the server rejects it.
#[derive(Debug, Clone)]
pub enum Snapshot<T> {
    /// A speculative create: drop the provisional entity.
    Created { provisional_id: String },
    /// A speculative update: restore the prior record in place.
    Updated { prior: T },
    /// A speculative remove: reinsert the prior record at its old index.
    Removed { index: usize, prior: T },
}

/// Replace speculative local state with the server's authoritative record.
///
/// Looks the entity up under its provisional id first (a create confirming)
/// and under the confirmed id second (an update, or a reconcile applied
/// twice). Applying the same confirmed response again is a no-op, and a
/// record the local copy never held is simply adopted.
pub fn reconcile<T: SyncEntity>(entities: &mut Vec<T>, provisional_id: &str, confirmed: T) {
    if let Some(slot) = entities
        .iter_mut()
        .find(|e| e.id() == provisional_id || e.id() == confirmed.id())
    {
        *slot = confirmed;
    } else {
        entities.push(confirmed);
    }
}

/// Restore local state from the pre-mutation snapshot.
pub fn roll_back<T: SyncEntity>(entities: &mut Vec<T>, snapshot: Snapshot<T>) {
    match snapshot {
        Snapshot::Created { provisional_id } => {
            entities.retain(|e| e.id() != provisional_id);
        }
        Snapshot::Updated { prior } => {
            if let Some(slot) = entities.iter_mut().find(|e| e.id() == prior.id()) {
                *slot = prior;
            } else {
                entities.push(prior);
            }
        }
        Snapshot::Removed { index, prior } => {
            let at = index.min(entities.len());
            entities.insert(at, prior);
        }
    }
}
