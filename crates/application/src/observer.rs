use std::sync::Arc;

use dashmap::DashMap;
use domain::{Result, SnapshotListener};
use tracing::warn;
use uuid::Uuid;

/// Handle returned when registering a listener; removal is by handle only
pub type ListenerId = Uuid;

/// Observer registry keyed by subscription handle.
///
/// Two registrations of the same callback get distinct handles, so
/// removing one never removes the other.
pub struct ListenerRegistry<L: ?Sized + Send + Sync> {
    entries: DashMap<ListenerId, Arc<L>>,
}

impl<L: ?Sized + Send + Sync> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = Uuid::new_v4();
        self.entries.insert(id, listener);
        id
    }

    pub fn remove(&self, id: &ListenerId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Clones the current listeners out so callbacks run without holding shard locks
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: ?Sized + Send + Sync> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort, fire-and-forget delivery of freshly composed snapshots
pub struct SnapshotFanout<S: Send + Sync + 'static> {
    listeners: Arc<ListenerRegistry<dyn SnapshotListener<S>>>,
}

impl<S: Send + Sync + 'static> SnapshotFanout<S> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn SnapshotListener<S>>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove(&self, id: &ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Compose and deliver on a separate task; the caller never waits on listeners.
    ///
    /// A failed composition or listener is logged and does not affect the others.
    pub fn republish<F>(&self, compose: F)
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        if self.listeners.is_empty() {
            return;
        }
        let listeners = self.listeners.clone();
        tokio::spawn(async move {
            let snapshot = match compose() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "Could not compose snapshot for listeners");
                    return;
                }
            };
            for listener in listeners.snapshot() {
                if let Err(e) = listener.on_snapshot(&snapshot).await {
                    warn!(error = %e, "Snapshot listener failed");
                }
            }
        });
    }
}

impl<S: Send + Sync + 'static> Default for SnapshotFanout<S> {
    fn default() -> Self {
        Self::new()
    }
}
