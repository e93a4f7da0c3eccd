//! Per-session orchestration context.
//!
//! One [`ViewSession`] exists per application session. It owns the map,
//! the credential cache, and the four orchestration components, and it
//! is the only place they are wired together:
//!
//! ```text
//!  LayerLifecycleManager ──layer set ready──► InitializationTracker
//!          │                                          │
//!          ▼                                          ▼
//!         Map ◄──rebuild── BasemapSwitcher       Initialized
//!
//!  AuthChallengeCoordinator ──credentials──► CredentialCache
//!
//!  every component ──ViewEvent──► FanoutEventSink (tracing + broadcast)
//! ```
//!
//! # Lifecycle
//!
//! 1. **Creation**: `new()` wires the components to the host's service
//!    implementations
//! 2. **Population**: basemap switch + `add_layer()` calls
//! 3. **Start**: `start()` arms the readiness timeout
//! 4. **Operation**: the host reports layer outcomes, switches
//!    basemaps, forwards challenges
//! 5. **Shutdown**: `shutdown()` cancels the session token; the
//!    tracker's outstanding timeout/settle tasks exit with it

use super::events::{BroadcastEventSink, EventSink, FanoutEventSink, TracingEventSink, ViewEvent};
use super::tracker::InitializationTracker;
use crate::auth::{
    AuthChallengeCoordinator, AuthError, ChallengeOptions, Credential, CredentialCache,
    IdentityGateway,
};
use crate::basemap::{BasemapSwitcher, SwitchError};
use crate::catalog::BaseMapInfo;
use crate::config::ViewConfig;
use crate::geo::Feature;
use crate::layer::{Layer, LayerInitData, LayerLifecycleManager};
use crate::map::{Map, MapBehavior};
use crate::service::{ConfirmationGate, GeometryService, MapService, StyleProvider};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// External collaborators a session is wired to.
///
/// These are the opaque async boundaries of the orchestration core: the
/// host supplies network-backed implementations, tests supply stubs.
pub struct SessionServices {
    pub map_service: Arc<dyn MapService>,
    pub geometry: Arc<dyn GeometryService>,
    pub styles: Arc<dyn StyleProvider>,
    pub confirmations: Arc<dyn ConfirmationGate>,
    pub identity: Arc<dyn IdentityGateway>,
}

/// The orchestration context for one application session.
pub struct ViewSession {
    map: Arc<Map>,
    credentials: Arc<CredentialCache>,
    tracker: Arc<InitializationTracker>,
    lifecycle: Arc<LayerLifecycleManager>,
    switcher: Arc<BasemapSwitcher>,
    auth: Arc<AuthChallengeCoordinator>,
    broadcast: Arc<BroadcastEventSink>,
    shutdown_token: CancellationToken,
}

impl ViewSession {
    /// Wire up a session against the host's service implementations.
    pub fn new(config: ViewConfig, services: SessionServices) -> Self {
        info!("Creating view session");

        let broadcast = Arc::new(BroadcastEventSink::default());
        let sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(TracingEventSink),
            Arc::clone(&broadcast) as Arc<dyn EventSink>,
        ];
        let events: Arc<dyn EventSink> = Arc::new(FanoutEventSink::new(sinks));

        let map = Arc::new(Map::new());
        let credentials = Arc::new(CredentialCache::new());
        let shutdown_token = CancellationToken::new();
        let tracker = Arc::new(InitializationTracker::new(
            &config,
            Arc::clone(&events),
            shutdown_token.clone(),
        ));
        let lifecycle = Arc::new(LayerLifecycleManager::new(
            Arc::clone(&map),
            Arc::clone(&services.styles),
            Arc::clone(&services.geometry),
            Arc::clone(&tracker),
            Arc::clone(&events),
        ));
        let switcher = Arc::new(BasemapSwitcher::new(
            &config,
            Arc::clone(&map),
            Arc::clone(&services.map_service),
            Arc::clone(&services.geometry),
            Arc::clone(&services.confirmations),
            Arc::clone(&events),
        ));
        let auth = Arc::new(AuthChallengeCoordinator::new(
            &config,
            Arc::clone(&credentials),
            Arc::clone(&services.identity),
        ));

        Self {
            map,
            credentials,
            tracker,
            lifecycle,
            switcher,
            auth,
            broadcast,
            shutdown_token,
        }
    }

    /// The session's map.
    pub fn map(&self) -> &Arc<Map> {
        &self.map
    }

    /// The session's credential cache.
    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.broadcast.subscribe()
    }

    /// Begin the initialization cycle: the readiness timeout starts and
    /// an already-complete layer set is announced right away.
    pub fn start(&self) {
        info!("View session starting");
        self.tracker.arm();
        self.lifecycle.announce_if_complete();
    }

    /// Register an externally tracked async initializer (extension
    /// behavior, tool). Pair with [`Self::complete_pending`].
    pub fn register_pending(&self) {
        self.tracker.register_pending();
    }

    /// Complete an externally tracked async initializer.
    pub fn complete_pending(&self) {
        self.tracker.complete();
    }

    /// Add an operational layer: it joins the map's collection and the
    /// lifecycle manager takes responsibility for it.
    pub fn add_layer(&self, layer: Arc<Layer>) {
        self.map.layers().add(Arc::clone(&layer));
        self.lifecycle.attach(&layer);
    }

    /// Report a layer load finishing successfully.
    pub async fn complete_layer(&self, layer: &Arc<Layer>, data: LayerInitData) {
        self.lifecycle.complete_initialization(layer, data).await;
    }

    /// Report a layer load failing.
    pub fn fail_layer(&self, layer: &Arc<Layer>, message: &str) {
        self.lifecycle.fail_initialization(layer, message);
    }

    /// Report a post-initialization layer data update.
    pub async fn update_layer(&self, layer: &Arc<Layer>, features: Vec<Feature>) {
        self.lifecycle.complete_update(layer, features).await;
    }

    /// Replace the basemap.
    pub async fn switch_basemap(&self, target: &BaseMapInfo) -> Result<(), SwitchError> {
        self.switcher.switch_basemap(target).await?;
        // The switch may have just given the map its spatial reference,
        // which is what the layer announcement waits on
        self.lifecycle.announce_if_complete();
        Ok(())
    }

    /// Attach a behavior to the map now and after every basemap switch.
    pub fn register_behavior(&self, behavior: Arc<dyn MapBehavior>) {
        self.switcher.register_behavior(behavior);
    }

    /// Resolve a credential challenge raised by a network operation.
    pub async fn challenge(
        &self,
        url: &str,
        options: ChallengeOptions,
    ) -> Result<Option<Credential>, AuthError> {
        self.auth.challenge(url, options).await
    }

    /// Drop all credentials and suppress challenges for one window.
    pub fn sign_out(&self) {
        self.auth.sign_out();
    }

    /// Wait for the session's ready signal.
    pub async fn wait_ready(&self) {
        self.tracker.wait_ready().await;
    }

    /// Whether the ready signal has been delivered.
    pub fn is_ready(&self) -> bool {
        self.tracker.is_ready()
    }

    /// Token cancelled when the session shuts down; hosts hang their
    /// own teardown off it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Tear the session down explicitly.
    pub fn shutdown(self) {
        info!("View session shutting down");
        self.shutdown_token.cancel();
    }
}

impl std::fmt::Debug for ViewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewSession")
            .field("layers", &self.map.layers().len())
            .field("ready", &self.tracker.is_ready())
            .finish_non_exhaustive()
    }
}
