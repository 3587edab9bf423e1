//! Observer hub: per-collection change subscriptions.
//!
//! Storage calls [`ObserverHub::notify`] after each committed mutation,
//! while it still holds the store's connection, so every subscriber sees a
//! collection's changes in commit order. Subscribers run on the writer's
//! thread and must not call back into the store synchronously.
//!
//! A subscriber that returns an error or panics is logged and skipped; it
//! never affects other subscribers or the write that triggered it.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use stowage_types::{Key, Operation};
use tracing::warn;

/// One committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub operation: Operation,
    /// Affected key; `None` for `clear`.
    pub key: Option<Key>,
    /// Stored value for `add`/`put`; `None` for `delete`/`clear`.
    pub value: Option<Value>,
}

/// A change callback.
pub type Subscriber = Arc<dyn Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync>;

/// Registry of subscribers, tagged by collection.
#[derive(Default)]
pub struct ObserverHub {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<String, Vec<(u64, Subscriber)>>>,
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ObserverHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `callback` for changes to `collection`.
    pub fn subscribe(
        self: &Arc<Self>,
        collection: &str,
        callback: impl Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers
            .entry(collection.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        Subscription {
            hub: Arc::downgrade(self),
            collection: collection.to_string(),
            id,
        }
    }

    /// Delivers `event` to every subscriber of its collection.
    ///
    /// Returns how many subscribers accepted it without error.
    pub fn notify(&self, event: &ChangeEvent) -> usize {
        let targets: Vec<Subscriber> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match subscribers.get(&event.collection) {
                Some(list) => list.iter().map(|(_, s)| Arc::clone(s)).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for subscriber in targets {
            match catch_unwind(AssertUnwindSafe(|| subscriber(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(
                    "subscriber for {} failed on {}: {e:#}",
                    event.collection, event.operation
                ),
                Err(_) => warn!(
                    "subscriber for {} panicked on {}",
                    event.collection, event.operation
                ),
            }
        }
        delivered
    }

    /// Number of registered subscribers across all collections.
    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.values().map(Vec::len).sum()
    }

    fn remove(&self, collection: &str, id: u64) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = subscribers.get_mut(collection) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(collection);
        }
        removed
    }
}

/// Handle returned by [`ObserverHub::subscribe`].
///
/// Dropping it leaves the subscription in place; call
/// [`Subscription::unsubscribe`] to stop receiving changes.
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<ObserverHub>,
    collection: String,
    id: u64,
}

impl Subscription {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Removes the subscription. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => hub.remove(&self.collection, self.id),
            None => false,
        }
    }
}
