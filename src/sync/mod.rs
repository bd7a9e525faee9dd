//! Client-side optimistic mutation layer.
//!
//! Mirrors what the portal frontend does with its local working copy:
//! apply a mutation to local state immediately, issue the request, then
//! reconcile with the authoritative server response or restore the
//! pre-mutation snapshot on failure. Every mutation resolves to a terminal
//! outcome; nothing is fire-and-forget and nothing retries automatically.

mod controller;
mod state;

pub use controller::{MutationController, Transport};
pub use state::{reconcile, roll_back, Snapshot};

/// Lifecycle of a mutation against one entity.
///
/// `Idle` is represented by the absence of a phase. `Confirmed` and
/// `RolledBack` are terminal; a new mutation on the same entity begins only
/// after the prior one reached a terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// Speculative state is applied locally; the request is in flight.
    Applied,
    /// The server confirmed; local state holds the authoritative record.
    Confirmed,
    /// The request failed; local state was restored from the snapshot.
    RolledBack,
}

/// Errors surfaced by the mutation controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The request failed in transit or was rejected by the server.
    Transport(String),
    /// The target entity is not present in local state.
    NotFound(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Transport(msg) => write!(f, "transport error: {}", msg),
            SyncError::NotFound(msg) => write!(f, "not found: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

/// An entity the controller can hold in its local working copy.
pub trait SyncEntity: Clone + Send + Sync + 'static {
    /// Sparse change description the client sends to the server.
    type Patch: Clone + Send + Sync;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: &str);

    /// Apply the patch to produce the speculative next state.
    fn apply_patch(&mut self, patch: &Self::Patch);
}
