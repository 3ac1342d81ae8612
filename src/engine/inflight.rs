//! Single-flight registry for concurrent cache-miss loads.
//!
//! Lives inside the same mutex as the record index (spec.md §9: "implemented
//! as an `in_flight: map<(table,key) -> future>` under the same mutex").
//! The leader for a key registers a broadcast sender before releasing the
//! lock to call the store; followers subscribe to a receiver and await it.

use std::collections::HashMap;

use tokio::sync::broadcast;

use crate::document::Document;
use crate::record::RecordKey;
use crate::store::StoreError;

/// Result of a store load, broadcast to every waiter on completion.
pub type LoadOutcome = Result<Option<Document>, StoreError>;

/// Tracks in-progress loads keyed by `(table, key)`.
#[derive(Default)]
pub struct InFlightRegistry {
    pending: HashMap<RecordKey, broadcast::Sender<LoadOutcome>>,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Returns a receiver if a load for `key` is already in progress.
    #[must_use]
    pub fn subscribe(&self, key: &RecordKey) -> Option<broadcast::Receiver<LoadOutcome>> {
        self.pending.get(key).map(broadcast::Sender::subscribe)
    }

    /// Registers the calling task as the leader for `key`. Callers must
    /// have just confirmed `subscribe` returned `None` under the same lock
    /// acquisition, or two leaders will race to call the store.
    pub fn register(&mut self, key: RecordKey) {
        let (tx, _rx) = broadcast::channel(1);
        self.pending.insert(key, tx);
    }

    /// Completes the load for `key`: broadcasts `outcome` to every waiter
    /// and removes the leader registration. A no-op if no load for `key`
    /// is registered (defensive; should not happen in practice).
    pub fn complete(&mut self, key: &RecordKey, outcome: LoadOutcome) {
        if let Some(tx) = self.pending.remove(key) {
            // Ignore send errors: every follower may have been dropped
            // (e.g. its task was cancelled) with no one left to notify.
            let _ = tx.send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_returns_none_when_not_registered() {
        let registry = InFlightRegistry::new();
        assert!(registry.subscribe(&RecordKey::new("t", "a")).is_none());
    }

    #[tokio::test]
    async fn waiter_receives_broadcast_outcome() {
        let mut registry = InFlightRegistry::new();
        let key = RecordKey::new("t", "a");
        registry.register(key.clone());
        let mut rx = registry.subscribe(&key).unwrap();

        registry.complete(&key, Ok(Some(serde_json::json!({"n": 1}))));

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.unwrap(), Some(serde_json::json!({"n": 1})));
        assert!(registry.subscribe(&key).is_none());
    }

    #[tokio::test]
    async fn multiple_waiters_all_receive_outcome() {
        let mut registry = InFlightRegistry::new();
        let key = RecordKey::new("t", "z");
        registry.register(key.clone());
        let mut rx1 = registry.subscribe(&key).unwrap();
        let mut rx2 = registry.subscribe(&key).unwrap();

        registry.complete(&key, Ok(None));

        assert_eq!(rx1.recv().await.unwrap().unwrap(), None);
        assert_eq!(rx2.recv().await.unwrap().unwrap(), None);
    }

    #[test]
    fn complete_without_registration_is_noop() {
        let mut registry = InFlightRegistry::new();
        registry.complete(&RecordKey::new("t", "missing"), Ok(None));
    }
}
