//! Optimistic mutation controller.
//!
//! Holds the client's working copy of a collection, applies mutations
//! speculatively, and resolves each one against the server through a
//! [`Transport`]. Mutations on distinct entities run concurrently;
//! mutations on the same entity queue on a per-entity gate and run in
//! arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use super::{reconcile, roll_back, MutationPhase, Snapshot, SyncEntity, SyncError};

/// The server as seen from the client: one call per mutation kind.
///
/// A request, once sent, always runs to completion or failure; there is no
/// cancellation primitive and the controller never retries on its own.
#[async_trait]
pub trait Transport<T: SyncEntity>: Send + Sync {
    /// Persist a draft; the response carries the server-assigned identity.
    async fn create(&self, draft: &T) -> Result<T, SyncError>;
    /// Apply a sparse patch; the response is the authoritative record.
    async fn update(&self, id: &str, patch: &T::Patch) -> Result<T, SyncError>;
    /// Delete by identifier.
    async fn remove(&self, id: &str) -> Result<(), SyncError>;
}

struct Shared<T> {
    entities: Vec<T>,
    phases: HashMap<String, MutationPhase>,
    /// provisional id -> server-assigned id, recorded when a create confirms
    aliases: HashMap<String, String>,
    /// per-entity serialization gates; waiters acquire in arrival order
    gates: HashMap<String, Arc<AsyncMutex<()>>>,
}

/// Client-side controller over a collection of entities.
pub struct MutationController<T, C> {
    shared: StdMutex<Shared<T>>,
    transport: C,
}

impl<T, C> MutationController<T, C>
where
    T: SyncEntity,
    C: Transport<T>,
{
    pub fn new(transport: C) -> Self {
        Self::with_entities(transport, Vec::new())
    }

    /// Start from a server-fetched working copy.
    pub fn with_entities(transport: C, entities: Vec<T>) -> Self {
        Self {
            shared: StdMutex::new(Shared {
                entities,
                phases: HashMap::new(),
                aliases: HashMap::new(),
                gates: HashMap::new(),
            }),
            transport,
        }
    }

    /// Current local working copy, speculative entries included.
    pub fn entities(&self) -> Vec<T> {
        self.lock_shared().entities.clone()
    }

    /// Phase of the most recent mutation touching `id`, if any.
    pub fn phase(&self, id: &str) -> Option<MutationPhase> {
        self.lock_shared().phases.get(id).copied()
    }

    /// Create an entity: it appears in local state immediately under a
    /// provisional id and is re-keyed to the server identity on confirm.
    pub async fn create(&self, mut draft: T) -> Result<T, SyncError> {
        let provisional = format!("pending-{}", uuid::Uuid::new_v4());
        draft.set_id(&provisional);

        let gate = self.gate(&provisional);
        let _guard = gate.lock().await;

        {
            let mut shared = self.lock_shared();
            shared.entities.push(draft.clone());
            shared
                .phases
                .insert(provisional.clone(), MutationPhase::Applied);
        }

        match self.transport.create(&draft).await {
            Ok(confirmed) => {
                let confirmed_id = confirmed.id().to_string();
                let mut shared = self.lock_shared();
                reconcile(&mut shared.entities, &provisional, confirmed.clone());
                shared
                    .aliases
                    .insert(provisional.clone(), confirmed_id.clone());
                // Mutations queued under the provisional id keep their place
                // in line: the confirmed id shares the same gate.
                let shared_gate = shared.gates.get(&provisional).cloned().unwrap_or_default();
                shared.gates.insert(confirmed_id.clone(), shared_gate);
                shared.phases.remove(&provisional);
                shared.phases.insert(confirmed_id, MutationPhase::Confirmed);
                Ok(confirmed)
            }
            Err(err) => {
                let mut shared = self.lock_shared();
                roll_back(
                    &mut shared.entities,
                    Snapshot::Created {
                        provisional_id: provisional.clone(),
                    },
                );
                shared.phases.insert(provisional, MutationPhase::RolledBack);
                Err(err)
            }
        }
    }

    /// Update an entity: the patch applies to local state immediately and
    /// the server record overwrites it on confirm.
    pub async fn update(&self, id: &str, patch: T::Patch) -> Result<T, SyncError> {
        let gate = self.gate(&self.resolve_id(id));
        let _guard = gate.lock().await;
        // A create may have confirmed while we waited for the gate.
        let target = self.resolve_id(id);

        let snapshot = {
            let mut shared = self.lock_shared();
            let Some(slot) = shared.entities.iter_mut().find(|e| e.id() == target) else {
                return Err(SyncError::NotFound(format!(
                    "entity {} is not in local state",
                    id
                )));
            };
            let snapshot = Snapshot::Updated {
                prior: slot.clone(),
            };
            slot.apply_patch(&patch);
            shared.phases.insert(target.clone(), MutationPhase::Applied);
            snapshot
        };

        match self.transport.update(&target, &patch).await {
            Ok(confirmed) => {
                let mut shared = self.lock_shared();
                reconcile(&mut shared.entities, &target, confirmed.clone());
                shared
                    .phases
                    .insert(target.clone(), MutationPhase::Confirmed);
                Ok(confirmed)
            }
            Err(err) => {
                let mut shared = self.lock_shared();
                roll_back(&mut shared.entities, snapshot);
                shared
                    .phases
                    .insert(target.clone(), MutationPhase::RolledBack);
                Err(err)
            }
        }
    }

    /// Remove an entity: it disappears from local state immediately and is
    /// reinserted at its old index if the server rejects the delete.
    ///
    /// A remove aimed at a provisional id queues behind the create and
    /// replays against the server-assigned id once the create confirms. If
    /// the create failed, there is nothing to remove and the call reports
    /// [`SyncError::NotFound`].
    pub async fn remove(&self, id: &str) -> Result<(), SyncError> {
        let gate = self.gate(&self.resolve_id(id));
        let _guard = gate.lock().await;
        let target = self.resolve_id(id);

        let snapshot = {
            let mut shared = self.lock_shared();
            let Some(index) = shared.entities.iter().position(|e| e.id() == target) else {
                return Err(SyncError::NotFound(format!(
                    "entity {} is not in local state",
                    id
                )));
            };
            let prior = shared.entities.remove(index);
            shared.phases.insert(target.clone(), MutationPhase::Applied);
            Snapshot::Removed { index, prior }
        };

        match self.transport.remove(&target).await {
            Ok(()) => {
                let mut shared = self.lock_shared();
                shared
                    .phases
                    .insert(target.clone(), MutationPhase::Confirmed);
                Ok(())
            }
            Err(err) => {
                let mut shared = self.lock_shared();
                roll_back(&mut shared.entities, snapshot);
                shared
                    .phases
                    .insert(target.clone(), MutationPhase::RolledBack);
                Err(err)
            }
        }
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().expect("sync state lock poisoned")
    }

    fn resolve_id(&self, id: &str) -> String {
        let shared = self.lock_shared();
        shared
            .aliases
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn gate(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut shared = self.lock_shared();
        shared.gates.entry(id.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use tokio::sync::Notify;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        title: String,
    }

    impl Item {
        fn new(id: &str, title: &str) -> Self {
            Self {
                id: id.to_string(),
                title: title.to_string(),
            }
        }
    }

    impl SyncEntity for Item {
        type Patch = String;

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: &str) {
            self.id = id.to_string();
        }

        fn apply_patch(&mut self, patch: &String) {
            self.title = patch.clone();
        }
    }

    /// Scriptable server stand-in. `pause_create` parks create calls until
    /// `release` is notified, which lets tests observe speculative state.
    #[derive(Clone, Default)]
    struct MockTransport {
        inner: Arc<MockInner>,
    }

    #[derive(Default)]
    struct MockInner {
        release: Notify,
        pause_create: AtomicBool,
        fail_create: AtomicBool,
        fail_update: AtomicBool,
        fail_remove: AtomicBool,
        next_id: AtomicU64,
        removed_ids: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport<Item> for MockTransport {
        async fn create(&self, draft: &Item) -> Result<Item, SyncError> {
            if self.inner.pause_create.load(Ordering::SeqCst) {
                self.inner.release.notified().await;
            }
            if self.inner.fail_create.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("create rejected".to_string()));
            }
            let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut confirmed = draft.clone();
            confirmed.set_id(&n.to_string());
            Ok(confirmed)
        }

        async fn update(&self, id: &str, patch: &String) -> Result<Item, SyncError> {
            if self.inner.fail_update.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("update rejected".to_string()));
            }
            Ok(Item::new(id, &format!("{} (confirmed)", patch)))
        }

        async fn remove(&self, id: &str) -> Result<(), SyncError> {
            if self.inner.fail_remove.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("remove rejected".to_string()));
            }
            self.inner
                .removed_ids
                .lock()
                .unwrap()
                .push(id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_rekeys_to_server_identity() {
        let transport = MockTransport::default();
        let controller = MutationController::new(transport);

        let confirmed = controller
            .create(Item::new("", "Q1 Review"))
            .await
            .unwrap();

        assert_eq!(confirmed, Item::new("1", "Q1 Review"));
        assert_eq!(controller.entities(), vec![Item::new("1", "Q1 Review")]);
        assert_eq!(controller.phase("1"), Some(MutationPhase::Confirmed));
    }

    #[tokio::test]
    async fn test_speculative_entity_visible_while_create_in_flight() {
        let transport = MockTransport::default();
        transport.inner.pause_create.store(true, Ordering::SeqCst);
        let controller = MutationController::new(transport.clone());

        let (created, _) = tokio::join!(controller.create(Item::new("", "Q1 Review")), async {
            let speculative = controller.entities();
            assert_eq!(speculative.len(), 1);
            assert!(speculative[0].id().starts_with("pending-"));
            assert_eq!(speculative[0].title, "Q1 Review");
            assert_eq!(
                controller.phase(speculative[0].id()),
                Some(MutationPhase::Applied)
            );
            transport.inner.release.notify_one();
        });

        let confirmed = created.unwrap();
        assert_eq!(confirmed.id(), "1");
        assert_eq!(controller.entities(), vec![confirmed]);
    }

    #[tokio::test]
    async fn test_failed_create_drops_speculative_entity() {
        let transport = MockTransport::default();
        transport.inner.fail_create.store(true, Ordering::SeqCst);
        let controller = MutationController::new(transport);

        let err = controller
            .create(Item::new("", "doomed"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        assert!(controller.entities().is_empty());
    }

    #[tokio::test]
    async fn test_update_reconciles_with_server_record() {
        let transport = MockTransport::default();
        let controller =
            MutationController::with_entities(transport, vec![Item::new("1", "before")]);

        let confirmed = controller.update("1", "after".to_string()).await.unwrap();

        // The server response wins over the speculative patch result.
        assert_eq!(confirmed, Item::new("1", "after (confirmed)"));
        assert_eq!(controller.entities(), vec![confirmed]);
        assert_eq!(controller.phase("1"), Some(MutationPhase::Confirmed));
    }

    #[tokio::test]
    async fn test_failed_update_restores_prior_state() {
        let transport = MockTransport::default();
        transport.inner.fail_update.store(true, Ordering::SeqCst);
        let before = vec![Item::new("1", "original"), Item::new("2", "other")];
        let controller = MutationController::with_entities(transport, before.clone());

        let err = controller
            .update("1", "speculative".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(controller.entities(), before);
        assert_eq!(controller.phase("1"), Some(MutationPhase::RolledBack));
    }

    #[tokio::test]
    async fn test_remove_confirms_and_clears_entity() {
        let transport = MockTransport::default();
        let controller =
            MutationController::with_entities(transport.clone(), vec![Item::new("1", "gone")]);

        controller.remove("1").await.unwrap();

        assert!(controller.entities().is_empty());
        assert_eq!(controller.phase("1"), Some(MutationPhase::Confirmed));
        assert_eq!(*transport.inner.removed_ids.lock().unwrap(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_failed_remove_reinserts_at_old_index() {
        let transport = MockTransport::default();
        transport.inner.fail_remove.store(true, Ordering::SeqCst);
        let before = vec![Item::new("1", "a"), Item::new("2", "b")];
        let controller = MutationController::with_entities(transport, before.clone());

        let err = controller.remove("1").await.unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(controller.entities(), before);
        assert_eq!(controller.phase("1"), Some(MutationPhase::RolledBack));
    }

    #[tokio::test]
    async fn test_remove_of_unknown_entity_reports_not_found() {
        let transport = MockTransport::default();
        let controller: MutationController<Item, _> = MutationController::new(transport);

        let err = controller.remove("missing").await.unwrap_err();

        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_queued_behind_create_replays_against_real_id() {
        let transport = MockTransport::default();
        transport.inner.pause_create.store(true, Ordering::SeqCst);
        let controller = MutationController::new(transport.clone());

        let (created, removed) =
            tokio::join!(controller.create(Item::new("", "ephemeral")), async {
                let provisional = controller.entities()[0].id().to_string();
                transport.inner.release.notify_one();
                // Queues on the entity gate until the create resolves.
                controller.remove(&provisional).await
            });

        assert_eq!(created.unwrap().id(), "1");
        removed.unwrap();
        assert!(controller.entities().is_empty());
        assert_eq!(*transport.inner.removed_ids.lock().unwrap(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_remove_after_failed_create_reports_not_found() {
        let transport = MockTransport::default();
        transport.inner.pause_create.store(true, Ordering::SeqCst);
        transport.inner.fail_create.store(true, Ordering::SeqCst);
        let controller = MutationController::new(transport.clone());

        let (created, removed) =
            tokio::join!(controller.create(Item::new("", "doomed")), async {
                let provisional = controller.entities()[0].id().to_string();
                transport.inner.release.notify_one();
                controller.remove(&provisional).await
            });

        assert!(created.is_err());
        assert!(matches!(removed.unwrap_err(), SyncError::NotFound(_)));
        assert!(controller.entities().is_empty());
        assert!(transport.inner.removed_ids.lock().unwrap().is_empty());
    }
}
