//! Ordered layer collection with suppressible change notifications.
//!
//! The basemap switcher rebuilds the collection in several steps (clear,
//! re-add basemap, re-add operational layers). Observers reacting to
//! each intermediate step would see a half-built map, so the switcher
//! suppresses notifications for the duration of the swap. Suppressed
//! changes are dropped outright, not queued: after the swap the
//! collection is announced wholesale through a map-level event instead.

use crate::layer::Layer;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// A single change to the layer collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange {
    Added(String),
    Removed(String),
    Cleared,
}

/// Observer of layer collection changes.
pub trait CollectionObserver: Send + Sync {
    fn collection_changed(&self, change: &CollectionChange);
}

#[derive(Debug)]
struct CollectionInner {
    layers: Vec<Arc<Layer>>,
    suppressed: bool,
}

/// Ordered collection of the map's layers.
///
/// Index 0 is the basemap slot; operational layers follow in draw
/// order.
pub struct LayerCollection {
    inner: Mutex<CollectionInner>,
    observers: Mutex<Vec<Arc<dyn CollectionObserver>>>,
}

impl LayerCollection {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CollectionInner {
                layers: Vec::new(),
                suppressed: false,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer for collection changes.
    pub fn subscribe(&self, observer: Arc<dyn CollectionObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Append a layer at the end of the draw order.
    pub fn add(&self, layer: Arc<Layer>) {
        let id = layer.id().to_string();
        let suppressed = {
            let mut inner = self.inner.lock().unwrap();
            inner.layers.push(layer);
            inner.suppressed
        };
        self.notify(suppressed, CollectionChange::Added(id));
    }

    /// Insert a layer at index 0, the basemap slot.
    pub fn insert_first(&self, layer: Arc<Layer>) {
        let id = layer.id().to_string();
        let suppressed = {
            let mut inner = self.inner.lock().unwrap();
            inner.layers.insert(0, layer);
            inner.suppressed
        };
        self.notify(suppressed, CollectionChange::Added(id));
    }

    /// Remove a layer by id.
    pub fn remove(&self, id: &str) -> Option<Arc<Layer>> {
        let (removed, suppressed) = {
            let mut inner = self.inner.lock().unwrap();
            let position = inner.layers.iter().position(|layer| layer.id() == id);
            let removed = position.map(|index| inner.layers.remove(index));
            (removed, inner.suppressed)
        };
        if removed.is_some() {
            self.notify(suppressed, CollectionChange::Removed(id.to_string()));
        }
        removed
    }

    /// Remove every layer.
    pub fn clear(&self) {
        let suppressed = {
            let mut inner = self.inner.lock().unwrap();
            inner.layers.clear();
            inner.suppressed
        };
        self.notify(suppressed, CollectionChange::Cleared);
    }

    /// Look up a layer by id.
    pub fn get(&self, id: &str) -> Option<Arc<Layer>> {
        self.inner
            .lock()
            .unwrap()
            .layers
            .iter()
            .find(|layer| layer.id() == id)
            .cloned()
    }

    /// Layer count.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().layers.is_empty()
    }

    /// Snapshot of the layers in draw order.
    pub fn snapshot(&self) -> Vec<Arc<Layer>> {
        self.inner.lock().unwrap().layers.clone()
    }

    /// Turn change notifications on or off. While suppressed, changes
    /// are dropped.
    pub fn set_notifications_suppressed(&self, suppressed: bool) {
        self.inner.lock().unwrap().suppressed = suppressed;
    }

    /// Whether change notifications are currently suppressed.
    pub fn notifications_suppressed(&self) -> bool {
        self.inner.lock().unwrap().suppressed
    }

    fn notify(&self, suppressed: bool, change: CollectionChange) {
        if suppressed {
            trace!(?change, "Collection change dropped while suppressed");
            return;
        }
        let observers = self.observers.lock().unwrap().clone();
        for observer in observers {
            observer.collection_changed(&change);
        }
    }
}

impl Default for LayerCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LayerCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("LayerCollection")
            .field("len", &inner.layers.len())
            .field("suppressed", &inner.suppressed)
            .finish_non_exhaustive()
    }
}
