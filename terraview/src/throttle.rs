//! Restartable one-shot timer for challenge throttling.
//!
//! Wraps a deadline plus a stored action. `invoke()` arms the timer;
//! calling it again before the deadline restarts the countdown instead of
//! queueing a second firing. When the deadline finally elapses the action
//! runs exactly once and the timer returns to idle.
//!
//! # State Machine
//!
//! ```text
//! Idle --[invoke()]--> Pending
//! Pending --[invoke()]--> Pending (deadline restarted)
//! Pending --[deadline elapses]--> Idle (action fires once)
//! Pending --[cancel()]--> Idle (action suppressed)
//! ```
//!
//! # Thread Safety
//!
//! The timer hands its deadline to a spawned task; a generation counter
//! guarded by `Mutex` lets `invoke()` and `cancel()` invalidate any task
//! still sleeping on an older deadline.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

/// Action fired when the throttle interval elapses.
pub type ThrottleAction = Arc<dyn Fn() + Send + Sync>;

/// Internal mutable state for the timer.
struct ThrottleInner {
    /// Bumped on every invoke/cancel; a sleeping task only fires if its
    /// generation is still current when it wakes.
    generation: u64,
    /// Whether a deadline is armed and the action has not yet fired.
    pending: bool,
}

/// A restartable one-shot timer.
///
/// Used to hold a gate open for a fixed window: repeated triggers extend
/// the window rather than stacking extra firings. The challenge
/// coordinator arms one of these after sign-out, credential reuse, and
/// user cancellation so that bursts of challenges collapse into a single
/// suppression window.
pub struct ThrottleTimer {
    interval: Duration,
    action: ThrottleAction,
    inner: Arc<Mutex<ThrottleInner>>,
}

impl std::fmt::Debug for ThrottleTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleTimer")
            .field("interval", &self.interval)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl ThrottleTimer {
    /// Create a timer with the given interval and elapse action.
    ///
    /// The timer starts idle; nothing runs until [`invoke`](Self::invoke).
    pub fn new(interval: Duration, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            interval,
            action: Arc::new(action),
            inner: Arc::new(Mutex::new(ThrottleInner {
                generation: 0,
                pending: false,
            })),
        }
    }

    /// Arm the timer, restarting the deadline if one is already pending.
    ///
    /// Must be called from within a tokio runtime: the deadline lives on a
    /// spawned task.
    pub fn invoke(&self) {
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            inner.generation += 1;
            inner.pending = true;
            inner.generation
        };
        trace!(generation, interval_ms = self.interval.as_millis() as u64, "Throttle armed");

        let interval = self.interval;
        let action = Arc::clone(&self.action);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            {
                let mut state = inner.lock().unwrap();
                if state.generation != generation || !state.pending {
                    // Restarted or cancelled while we slept
                    return;
                }
                state.pending = false;
            }
            trace!(generation, "Throttle elapsed, firing action");
            action();
        });
    }

    /// Stop a pending deadline without firing the action.
    ///
    /// No-op if the timer is idle.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        inner.pending = false;
    }

    /// Whether a deadline is armed and the action has not yet fired.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().unwrap().pending
    }
}
