//! Configuration for the view orchestration core.
//!
//! All tunables live in [`ViewConfig`] so tests can compress the timing
//! windows instead of waiting out production-length deadlines.

use std::time::Duration;

/// Default ceiling on how long startup waits for sub-initializations.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default settle delay between readiness being reached and the ready
/// signal being emitted. Gives in-flight layout work a chance to land.
pub const DEFAULT_POST_READY_DELAY: Duration = Duration::from_millis(500);

/// Default width of the challenge suppression windows.
pub const DEFAULT_AUTH_WINDOW: Duration = Duration::from_secs(2);

/// Default number of silent retries when a service omits its map units.
pub const DEFAULT_MAP_UNITS_RETRIES: u32 = 3;

/// Configuration for a [`ViewSession`](crate::runtime::ViewSession).
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Maximum time to wait for pending sub-initializations before the
    /// tracker declares readiness anyway (default: 30s).
    pub init_timeout: Duration,
    /// Delay between readiness and the ready signal (default: 500ms).
    pub post_ready_delay: Duration,
    /// Width of the post-sign-out, post-reuse, and post-cancel challenge
    /// suppression windows (default: 2s).
    pub auth_window: Duration,
    /// Silent retries when a basemap service reports no map units
    /// (default: 3).
    pub map_units_retries: u32,
    /// Portal endpoint; challenges whose service lives under this URL get
    /// the portal sign-in flow instead of the direct server prompt.
    pub portal_url: Option<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            post_ready_delay: DEFAULT_POST_READY_DELAY,
            auth_window: DEFAULT_AUTH_WINDOW,
            map_units_retries: DEFAULT_MAP_UNITS_RETRIES,
            portal_url: None,
        }
    }
}

impl ViewConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the startup readiness timeout.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Set the settle delay before the ready signal.
    pub fn with_post_ready_delay(mut self, delay: Duration) -> Self {
        self.post_ready_delay = delay;
        self
    }

    /// Set the challenge suppression window width.
    pub fn with_auth_window(mut self, window: Duration) -> Self {
        self.auth_window = window;
        self
    }

    /// Set the silent retry budget for missing map units.
    pub fn with_map_units_retries(mut self, retries: u32) -> Self {
        self.map_units_retries = retries;
        self
    }

    /// Set the portal endpoint for portal-routed sign-in.
    pub fn with_portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = Some(url.into());
        self
    }
}
