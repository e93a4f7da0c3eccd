//! Aggregate initialization readiness tracking.
//!
//! The tracker counts in-flight async sub-initializations (layers,
//! behaviors, tools) and fires a single readiness signal:
//!
//! ```text
//!   arm()          register_pending() / complete()
//!     |                        |
//!     v                        v
//!   [ waiting: pending > 0 or layers not announced ]
//!     |                        |
//!     | timeout                | pending == 0 && layers_ready
//!     v                        v
//!   [ fired ]  <--- exactly once, whichever comes first
//!     |
//!     | post-ready settle delay
//!     v
//!   Initialized event + ready signal
//! ```
//!
//! A failed sub-initializer is logged and still counted as complete;
//! only total non-completion leaves the timeout path to fire. The
//! settle delay between the condition being met and the signal is a
//! contract: downstream consumers get one more pass before acting on
//! readiness.

use super::events::{EventSink, ViewEvent};
use crate::config::ViewConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
struct TrackerInner {
    /// In-flight async registrations.
    pending: usize,
    /// Set once every attached layer completed with the map's spatial
    /// reference known.
    layers_ready: bool,
    /// Whether the timeout clock is running.
    armed: bool,
    /// Latched on first fire; nothing re-fires after this.
    fired: bool,
}

/// Tracks pending startup work and fires readiness exactly once.
pub struct InitializationTracker {
    timeout: Duration,
    post_ready_delay: Duration,
    events: Arc<dyn EventSink>,
    /// Cancelled on session shutdown; outstanding timeout and settle
    /// tasks exit without firing or signalling.
    cancel: CancellationToken,
    inner: Mutex<TrackerInner>,
    ready_tx: watch::Sender<bool>,
    /// Held so the channel outlives periods with no waiters.
    ready_rx: watch::Receiver<bool>,
}

impl InitializationTracker {
    pub fn new(config: &ViewConfig, events: Arc<dyn EventSink>, cancel: CancellationToken) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            timeout: config.init_timeout,
            post_ready_delay: config.post_ready_delay,
            events,
            cancel,
            inner: Mutex::new(TrackerInner {
                pending: 0,
                layers_ready: false,
                armed: false,
                fired: false,
            }),
            ready_tx,
            ready_rx,
        }
    }

    /// Start the initialization cycle: the timeout clock begins and the
    /// tracker becomes eligible to fire. Arming twice is a no-op.
    pub fn arm(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.armed {
                return;
            }
            inner.armed = true;
        }
        debug!(
            timeout_ms = self.timeout.as_millis() as u64,
            "Initialization tracking armed"
        );

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tracker.cancel.cancelled() => {
                    debug!("Initialization timeout task cancelled");
                    return;
                }
                _ = tokio::time::sleep(tracker.timeout) => {}
            }
            let (fired, pending, layers_ready) = {
                let inner = tracker.inner.lock().unwrap();
                (inner.fired, inner.pending, inner.layers_ready)
            };
            if !fired {
                warn!(
                    pending,
                    layers_ready, "Initialization timeout elapsed, forcing readiness"
                );
                tracker.fire("timeout");
            }
        });

        // Everything may already be accounted for by the time we arm.
        self.maybe_fire();
    }

    /// Record one more in-flight sub-initialization.
    pub fn register_pending(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending += 1;
        trace!(pending = inner.pending, "Pending initialization registered");
    }

    /// Record a sub-initialization finishing successfully.
    pub fn complete(self: &Arc<Self>) {
        self.decrement();
        self.maybe_fire();
    }

    /// Record a sub-initialization failing. The failure is reported and
    /// still counts toward completion, so readiness is never blocked by
    /// a broken dependency.
    pub fn complete_with_error(self: &Arc<Self>, message: &str) {
        warn!(message, "Sub-initialization failed");
        self.events.emit(ViewEvent::InitializationFailed {
            message: message.to_string(),
        });
        self.decrement();
        self.maybe_fire();
    }

    /// Mark the layer set as fully observed. Callers only do this once
    /// the map's spatial reference is known.
    pub fn notify_layers_ready(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.layers_ready {
                return;
            }
            inner.layers_ready = true;
        }
        debug!("Layer set observed as ready");
        self.maybe_fire();
    }

    /// Outstanding sub-initialization count.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().pending
    }

    /// Whether the readiness condition has latched (the settle delay
    /// may still be running).
    pub fn has_fired(&self) -> bool {
        self.inner.lock().unwrap().fired
    }

    /// Whether the ready signal has been delivered to consumers.
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Wait until the ready signal is delivered. Resolves immediately
    /// if readiness already happened.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    fn decrement(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending == 0 {
            warn!("Completion without a matching pending registration");
            return;
        }
        inner.pending -= 1;
        trace!(pending = inner.pending, "Pending initialization completed");
    }

    fn maybe_fire(self: &Arc<Self>) {
        let satisfied = {
            let inner = self.inner.lock().unwrap();
            inner.armed && !inner.fired && inner.layers_ready && inner.pending == 0
        };
        if satisfied {
            self.fire("all pending work complete");
        }
    }

    fn fire(self: &Arc<Self>, reason: &'static str) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.fired {
                return;
            }
            inner.fired = true;
        }
        info!(
            reason,
            settle_ms = self.post_ready_delay.as_millis() as u64,
            "Initialization complete, settling"
        );

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tracker.cancel.cancelled() => {
                    debug!("Settle task cancelled before the ready signal");
                    return;
                }
                _ = tokio::time::sleep(tracker.post_ready_delay) => {}
            }
            tracker.events.emit(ViewEvent::Initialized);
            let _ = tracker.ready_tx.send(true);
        });
    }
}

impl std::fmt::Debug for InitializationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("InitializationTracker")
            .field("pending", &inner.pending)
            .field("layers_ready", &inner.layers_ready)
            .field("armed", &inner.armed)
            .field("fired", &inner.fired)
            .finish_non_exhaustive()
    }
}
