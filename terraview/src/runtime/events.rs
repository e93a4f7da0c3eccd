//! View lifecycle events and their delivery.
//!
//! Events are fire-and-forget: emitters never wait for consumers, and
//! an event with no subscribers is simply dropped. Consumers that need
//! a stream subscribe through a [`BroadcastEventSink`].

use crate::map::Map;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Events raised over the life of a view session.
#[derive(Clone, Debug)]
pub enum ViewEvent {
    /// Startup settled: every tracked layer is accounted for (or the
    /// timeout elapsed) and the post-ready delay has passed.
    Initialized,

    /// A tracked layer failed to initialize. Raised per failure;
    /// readiness still proceeds.
    InitializationFailed {
        /// Human-readable failure description.
        message: String,
    },

    /// Every attached layer completed once the map's spatial reference
    /// was known. Raised at most once per session.
    MapLayersInitialized,

    /// The basemap switcher finished rebuilding the layer collection.
    /// Carries the (stable) map so consumers re-read its contents.
    MapRecreated {
        map: Arc<Map>,
    },

    /// A basemap switch completed.
    BaseMapChangeComplete {
        /// Catalog name of the new basemap.
        name: String,
    },

    /// A basemap switch was abandoned; the previous map is untouched.
    BaseMapChangeFailed {
        name: String,
        reason: String,
    },
}

impl ViewEvent {
    /// Returns a short name for this event type (useful for debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::InitializationFailed { .. } => "initialization_failed",
            Self::MapLayersInitialized => "map_layers_initialized",
            Self::MapRecreated { .. } => "map_recreated",
            Self::BaseMapChangeComplete { .. } => "basemap_change_complete",
            Self::BaseMapChangeFailed { .. } => "basemap_change_failed",
        }
    }
}

/// Destination for view events.
pub trait EventSink: Send + Sync {
    /// Deliver an event. Must not block.
    fn emit(&self, event: ViewEvent);
}

/// Sink that discards every event.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: ViewEvent) {}
}

/// Sink that logs each event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ViewEvent) {
        match &event {
            ViewEvent::InitializationFailed { message } => {
                warn!(event = event.event_type(), message = %message, "View event");
            }
            ViewEvent::BaseMapChangeFailed { name, reason } => {
                warn!(
                    event = event.event_type(),
                    basemap = %name,
                    reason = %reason,
                    "View event"
                );
            }
            ViewEvent::BaseMapChangeComplete { name } => {
                info!(event = event.event_type(), basemap = %name, "View event");
            }
            _ => {
                info!(event = event.event_type(), "View event");
            }
        }
    }
}

/// Sink backed by a broadcast channel.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<ViewEvent>,
}

impl BroadcastEventSink {
    /// Create a sink with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(16)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: ViewEvent) {
        // Ignore errors - no subscribers is OK
        let _ = self.tx.send(event);
    }
}

impl std::fmt::Debug for BroadcastEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastEventSink")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

/// Sink that forwards each event to several sinks in order.
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: ViewEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for FanoutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
