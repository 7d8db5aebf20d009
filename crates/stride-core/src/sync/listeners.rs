//! Subscriber registry for sync state snapshots.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::SyncState;

/// Callback invoked with every published state
pub type SyncListener = Arc<dyn Fn(&SyncState) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, SyncListener>,
}

/// Listeners keyed by registration order
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays registered until the handle unsubscribes.
    pub fn add(&self, listener: impl Fn(&SyncState) + Send + Sync + 'static) -> ListenerHandle {
        let mut registry = self.inner.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.insert(id, Arc::new(listener));
        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Call every listener with `state`.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe while being notified.
    pub fn notify(&self, state: &SyncState) {
        let listeners: Vec<SyncListener> = self.inner.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener(state);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unsubscribe handle returned by [`ListenerRegistry::add`]
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl ListenerHandle {
    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.lock().listeners.remove(&self.id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notify_reaches_every_listener_until_unsubscribed() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let calls = calls.clone();
            registry.add(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let calls = calls.clone();
            registry.add(move |_| {
                calls.fetch_add(10, Ordering::SeqCst);
            })
        };

        registry.notify(&SyncState::default());
        assert_eq!(calls.load(Ordering::SeqCst), 11);

        assert!(first.unsubscribe());
        registry.notify(&SyncState::default());
        assert_eq!(calls.load(Ordering::SeqCst), 21);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handle_outliving_registry_is_harmless() {
        let registry = ListenerRegistry::new();
        let handle = registry.add(|_| {});
        drop(registry);
        assert!(!handle.unsubscribe());
    }

    #[test]
    fn listener_may_subscribe_during_notify() {
        let registry = ListenerRegistry::new();
        let inner = registry.clone();
        let _handle = registry.add(move |_| {
            let _nested = inner.add(|_| {});
        });
        registry.notify(&SyncState::default());
        assert_eq!(registry.len(), 2);
    }
}
