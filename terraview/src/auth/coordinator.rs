//! Authentication challenge mediation.
//!
//! Network operations against secured endpoints raise challenges at
//! unpredictable times, usually in bursts (every tile request against a
//! freshly secured host raises its own). The coordinator funnels all of
//! them through one fallback chain and guarantees the user sees at most
//! one prompt per domain per suppression window.
//!
//! # Resolution Chain
//!
//! ```text
//! challenge(url)
//!   1. sign-out window open          -> resolve None
//!   2. url is a services root        -> resolve None
//!   3. reuse window + same domain    -> resolve cached credential
//!   4. cancel window + same resource -> resolve None
//!   5. refresh an existing credential -> resolve on success
//!   6. silent token generation        -> resolve on success
//!   7. interactive prompt             -> resolve credential or None
//! ```
//!
//! Steps 5 and 6 swallow their errors; the chain only surfaces a failure
//! when the interactive flow itself breaks.

use super::cache::{Credential, CredentialCache};
use super::error::AuthError;
use super::gateway::{IdentityGateway, SignInFlow, SignInOutcome};
use crate::config::ViewConfig;
use crate::throttle::ThrottleTimer;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use url::Url;

// =============================================================================
// Challenge types
// =============================================================================

/// Options accompanying a challenge.
#[derive(Debug, Clone, Default)]
pub struct ChallengeOptions {
    /// Proxy the request was routed through, when one is configured.
    /// Carried for diagnostics; proxying itself stays with the network
    /// client that raised the challenge.
    pub proxy_url: Option<String>,
}

/// The domain and path a challenge is asking about.
///
/// Cancellation suppression matches on both: dismissing a prompt for one
/// resource must not silence prompts for a different path on the same
/// host.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChallengedResource {
    domain: String,
    path: String,
}

impl ChallengedResource {
    fn parse(url: &str) -> Result<Self, AuthError> {
        let parsed = Url::parse(url).map_err(|source| AuthError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| AuthError::InvalidUrl {
                url: url.to_string(),
                source: url::ParseError::EmptyHost,
            })?
            .to_ascii_lowercase();
        Ok(Self {
            domain,
            path: parsed.path().to_string(),
        })
    }
}

/// Outcome published to every waiter coalesced onto one prompt.
type PromptResult = Result<Option<Credential>, AuthError>;

// =============================================================================
// Prompt coalescing
// =============================================================================

/// De-duplicates concurrent interactive prompts per domain.
///
/// The first challenge for a domain runs the sign-in flow; challenges
/// arriving while it is on screen subscribe to the same outcome instead
/// of stacking a second prompt.
struct PromptCoalescer {
    in_flight: DashMap<String, broadcast::Sender<PromptResult>>,
}

impl PromptCoalescer {
    fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Attempts to register a prompt for the given domain.
    ///
    /// Returns `Ok(receiver)` if a prompt is already on screen (caller
    /// should wait). Returns `Err(sender)` if this is a new prompt
    /// (caller should run the flow).
    fn register(
        &self,
        domain: &str,
    ) -> Result<broadcast::Receiver<PromptResult>, broadcast::Sender<PromptResult>> {
        match self.in_flight.entry(domain.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let rx = entry.get().subscribe();
                debug!(
                    domain,
                    waiters = entry.get().receiver_count(),
                    "Challenge coalesced onto in-flight prompt"
                );
                Ok(rx)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(16);
                entry.insert(tx.clone());
                Err(tx)
            }
        }
    }

    /// Completes a prompt, broadcasting the outcome to all waiters.
    fn complete(&self, domain: &str, result: PromptResult, tx: &broadcast::Sender<PromptResult>) {
        self.in_flight.remove(domain);
        let _ = tx.send(result);
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Mediates credential challenges raised by concurrent network operations.
///
/// One coordinator exists per session; all challenge chains share its
/// suppression windows and its view of the [`CredentialCache`].
pub struct AuthChallengeCoordinator {
    cache: Arc<CredentialCache>,
    gateway: Arc<dyn IdentityGateway>,
    portal_url: Option<String>,
    sign_out_window: ThrottleTimer,
    reuse_window: ThrottleTimer,
    cancel_window: ThrottleTimer,
    /// Credential retrieved most recently, reusable while the reuse
    /// window stays open.
    last_retrieved: Arc<Mutex<Option<Credential>>>,
    /// Resource whose prompt the user dismissed most recently, suppressed
    /// while the cancel window stays open.
    last_cancelled: Arc<Mutex<Option<ChallengedResource>>>,
    prompts: PromptCoalescer,
}

impl std::fmt::Debug for AuthChallengeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthChallengeCoordinator")
            .field("portal_url", &self.portal_url)
            .field("sign_out_pending", &self.sign_out_window.is_pending())
            .field("cached_domains", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl AuthChallengeCoordinator {
    /// Create a coordinator over the given cache and identity gateway.
    pub fn new(
        config: &ViewConfig,
        cache: Arc<CredentialCache>,
        gateway: Arc<dyn IdentityGateway>,
    ) -> Self {
        let last_retrieved: Arc<Mutex<Option<Credential>>> = Arc::new(Mutex::new(None));
        let last_cancelled: Arc<Mutex<Option<ChallengedResource>>> = Arc::new(Mutex::new(None));

        let retrieved_ref = Arc::clone(&last_retrieved);
        let reuse_window = ThrottleTimer::new(config.auth_window, move || {
            *retrieved_ref.lock().unwrap() = None;
        });
        let cancelled_ref = Arc::clone(&last_cancelled);
        let cancel_window = ThrottleTimer::new(config.auth_window, move || {
            *cancelled_ref.lock().unwrap() = None;
        });
        // The sign-out window carries no state beyond its pending flag
        let sign_out_window = ThrottleTimer::new(config.auth_window, || {});

        Self {
            cache,
            gateway,
            portal_url: config.portal_url.clone(),
            sign_out_window,
            reuse_window,
            cancel_window,
            last_retrieved,
            last_cancelled,
            prompts: PromptCoalescer::new(),
        }
    }

    /// Resolve a credential challenge for `url`.
    ///
    /// `Ok(Some(credential))` means the operation can retry with the
    /// credential. `Ok(None)` means the challenge was deliberately left
    /// unanswered: a suppression window was open, the resource class is
    /// never interactively authenticated, or the user dismissed the
    /// prompt. Callers treat `None` as a plain authorization failure.
    pub async fn challenge(
        &self,
        url: &str,
        options: ChallengeOptions,
    ) -> Result<Option<Credential>, AuthError> {
        // 1. Never prompt on the heels of a sign-out
        if self.sign_out_window.is_pending() {
            debug!(url, "Challenge suppressed: sign-out window open");
            return Ok(None);
        }

        // 2. The services directory root is never interactively authenticated
        if is_services_root(url) {
            debug!(url, "Challenge suppressed: services directory root");
            return Ok(None);
        }

        let resource = ChallengedResource::parse(url)?;

        // 3. Coalesce near-simultaneous challenges against the same host
        if self.reuse_window.is_pending() {
            let recent = self.last_retrieved.lock().unwrap().clone();
            if let Some(credential) = recent {
                if credential.domain == resource.domain {
                    trace!(domain = %resource.domain, "Challenge resolved from reuse window");
                    return Ok(Some(credential));
                }
            }
        }

        // 4. Do not re-prompt for a resource the user just dismissed
        if self.cancel_window.is_pending() {
            let cancelled = self.last_cancelled.lock().unwrap().clone();
            if cancelled.as_ref() == Some(&resource) {
                debug!(
                    domain = %resource.domain,
                    path = %resource.path,
                    "Challenge suppressed: sign-in recently cancelled"
                );
                return Ok(None);
            }
        }

        // 5. Try a credential already held for this domain
        if let Some(existing) = self.cache.find(&resource.domain) {
            match self.gateway.refresh_token(url, &existing).await {
                Ok(credential) => {
                    self.register_credential(credential.clone());
                    trace!(domain = %resource.domain, "Challenge resolved from existing credential");
                    return Ok(Some(credential));
                }
                // Probing failures fall through to the next strategy
                Err(err) => {
                    trace!(domain = %resource.domain, error = %err, "Credential refresh failed")
                }
            }
        }

        // 6. Fully silent generation (integrated/platform auth)
        match self.gateway.silent_token(url).await {
            Ok(credential) => {
                self.register_credential(credential.clone());
                trace!(domain = %resource.domain, "Challenge resolved silently");
                return Ok(Some(credential));
            }
            Err(err) => {
                trace!(domain = %resource.domain, error = %err, "Silent token generation failed")
            }
        }

        // 7. Interactive prompt, de-duplicated per domain
        self.prompt_interactive(url, &resource, &options).await
    }

    /// Drop all credentials and suppress challenges for one window.
    ///
    /// Secured layers raise a burst of re-challenges the instant their
    /// credentials disappear; the window keeps those from turning into
    /// prompts.
    pub fn sign_out(&self) {
        self.cache.clear();
        *self.last_retrieved.lock().unwrap() = None;
        *self.last_cancelled.lock().unwrap() = None;
        self.reuse_window.cancel();
        self.cancel_window.cancel();
        self.sign_out_window.invoke();
        debug!("Signed out; challenge suppression window open");
    }

    /// Whether the post-sign-out suppression window is currently open.
    pub fn sign_out_pending(&self) -> bool {
        self.sign_out_window.is_pending()
    }

    async fn prompt_interactive(
        &self,
        url: &str,
        resource: &ChallengedResource,
        options: &ChallengeOptions,
    ) -> PromptResult {
        let tx = match self.prompts.register(&resource.domain) {
            Ok(mut rx) => {
                // Another challenge already has the prompt on screen
                return match rx.recv().await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(domain = %resource.domain, "Prompt owner vanished; resolving unanswered");
                        Ok(None)
                    }
                };
            }
            Err(tx) => tx,
        };

        let flow = self.select_flow(url);
        debug!(
            domain = %resource.domain,
            ?flow,
            proxy = ?options.proxy_url,
            "Prompting for sign-in"
        );

        let result = match self.gateway.prompt(url, flow).await {
            Ok(SignInOutcome::SignedIn(credential)) => {
                self.register_credential(credential.clone());
                debug!(domain = %resource.domain, "Sign-in completed");
                Ok(Some(credential))
            }
            Ok(SignInOutcome::Cancelled) => {
                *self.last_cancelled.lock().unwrap() = Some(resource.clone());
                self.cancel_window.invoke();
                debug!(domain = %resource.domain, "Sign-in cancelled; suppression window open");
                Ok(None)
            }
            Err(err) => {
                warn!(domain = %resource.domain, error = %err, "Interactive sign-in failed");
                Err(AuthError::SignInFailed {
                    url: url.to_string(),
                    reason: err.to_string(),
                })
            }
        };

        self.prompts.complete(&resource.domain, result.clone(), &tx);
        result
    }

    /// Record a freshly retrieved credential: canonical per domain in the
    /// cache, and reusable while the reuse window stays open.
    fn register_credential(&self, credential: Credential) {
        self.cache.add(credential.clone());
        *self.last_retrieved.lock().unwrap() = Some(credential);
        self.reuse_window.invoke();
    }

    fn select_flow(&self, url: &str) -> SignInFlow {
        match &self.portal_url {
            Some(portal) if url_matches_portal(url, portal) => SignInFlow::Portal,
            _ => SignInFlow::Server,
        }
    }
}

// =============================================================================
// URL classification
// =============================================================================

/// Whether `url` points at a bare services directory root
/// (`.../rest/services`). That resource class is browsable without
/// credentials and never interactively authenticated.
fn is_services_root(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(segments) = parsed.path_segments() else {
        return false;
    };
    let segments: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
    let n = segments.len();
    n >= 2
        && segments[n - 2].eq_ignore_ascii_case("rest")
        && segments[n - 1].eq_ignore_ascii_case("services")
}

/// Whether `url` lives on the same host as the configured portal.
fn url_matches_portal(url: &str, portal: &str) -> bool {
    match (Url::parse(url), Url::parse(portal)) {
        (Ok(u), Ok(p)) => match (u.host_str(), p.host_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::BoxFuture;
    use crate::service::ServiceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Gateway with canned answers and call counters.
    #[derive(Default)]
    struct MockGateway {
        refresh_result: Option<Credential>,
        silent_result: Option<Credential>,
        prompt_outcome: Option<SignInOutcome>,
        refresh_count: AtomicUsize,
        silent_count: AtomicUsize,
        prompt_count: AtomicUsize,
    }

    impl IdentityGateway for MockGateway {
        fn refresh_token(
            &self,
            url: &str,
            _credential: &Credential,
        ) -> BoxFuture<'_, Result<Credential, ServiceError>> {
            self.refresh_count.fetch_add(1, Ordering::SeqCst);
            let result = match &self.refresh_result {
                Some(c) => Ok(c.clone()),
                None => Err(ServiceError::Denied {
                    url: url.to_string(),
                }),
            };
            Box::pin(async move { result })
        }

        fn silent_token(&self, url: &str) -> BoxFuture<'_, Result<Credential, ServiceError>> {
            self.silent_count.fetch_add(1, Ordering::SeqCst);
            let result = match &self.silent_result {
                Some(c) => Ok(c.clone()),
                None => Err(ServiceError::Denied {
                    url: url.to_string(),
                }),
            };
            Box::pin(async move { result })
        }

        fn prompt(
            &self,
            url: &str,
            _flow: SignInFlow,
        ) -> BoxFuture<'_, Result<SignInOutcome, ServiceError>> {
            self.prompt_count.fetch_add(1, Ordering::SeqCst);
            let result = match &self.prompt_outcome {
                Some(outcome) => Ok(outcome.clone()),
                None => Err(ServiceError::Timeout {
                    url: url.to_string(),
                }),
            };
            Box::pin(async move { result })
        }
    }

    fn coordinator_with(
        gateway: Arc<MockGateway>,
        config: ViewConfig,
    ) -> AuthChallengeCoordinator {
        AuthChallengeCoordinator::new(&config, Arc::new(CredentialCache::new()), gateway)
    }

    fn short_window_config() -> ViewConfig {
        ViewConfig::new().with_auth_window(Duration::from_millis(50))
    }

    #[test]
    fn test_services_root_detection() {
        assert!(is_services_root("https://host.example.com/arcgis/rest/services"));
        assert!(is_services_root("https://host.example.com/arcgis/REST/Services/"));
        assert!(!is_services_root("https://host.example.com/arcgis/rest/services/Roads/MapServer"));
        assert!(!is_services_root("https://host.example.com/"));
        assert!(!is_services_root("not a url"));
    }

    #[test]
    fn test_challenged_resource_parse() {
        let resource =
            ChallengedResource::parse("https://Maps.Example.com/arcgis/rest/services/Roads")
                .expect("valid url");
        assert_eq!(resource.domain, "maps.example.com");
        assert_eq!(resource.path, "/arcgis/rest/services/Roads");

        assert!(ChallengedResource::parse("::not-a-url::").is_err());
    }

    #[test]
    fn test_portal_flow_selection() {
        let gateway = Arc::new(MockGateway::default());
        let config = short_window_config().with_portal_url("https://portal.example.com/arcgis");
        let coordinator = coordinator_with(gateway, config);

        assert_eq!(
            coordinator.select_flow("https://portal.example.com/sharing/rest"),
            SignInFlow::Portal
        );
        assert_eq!(
            coordinator.select_flow("https://other.example.com/arcgis"),
            SignInFlow::Server
        );
    }

    #[tokio::test]
    async fn test_sign_out_suppresses_challenges() {
        let gateway = Arc::new(MockGateway {
            prompt_outcome: Some(SignInOutcome::SignedIn(Credential::new(
                "maps.example.com",
                "https://maps.example.com/s",
                "tok",
            ))),
            ..Default::default()
        });
        let coordinator = coordinator_with(Arc::clone(&gateway), short_window_config());

        coordinator.sign_out();
        let resolved = coordinator
            .challenge(
                "https://maps.example.com/arcgis/rest/services/Secure/MapServer",
                ChallengeOptions::default(),
            )
            .await
            .expect("challenge runs");

        assert!(resolved.is_none());
        assert_eq!(gateway.prompt_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_services_root_short_circuits_before_gateway() {
        let gateway = Arc::new(MockGateway::default());
        let coordinator = coordinator_with(Arc::clone(&gateway), short_window_config());

        let resolved = coordinator
            .challenge(
                "https://maps.example.com/arcgis/rest/services",
                ChallengeOptions::default(),
            )
            .await
            .expect("challenge runs");

        assert!(resolved.is_none());
        assert_eq!(gateway.refresh_count.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.silent_count.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.prompt_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_chain_reaches_prompt() {
        let credential = Credential::new("maps.example.com", "https://maps.example.com/s", "tok");
        let gateway = Arc::new(MockGateway {
            prompt_outcome: Some(SignInOutcome::SignedIn(credential.clone())),
            ..Default::default()
        });
        let coordinator = coordinator_with(Arc::clone(&gateway), short_window_config());

        let resolved = coordinator
            .challenge(
                "https://maps.example.com/arcgis/rest/services/Secure/MapServer",
                ChallengeOptions::default(),
            )
            .await
            .expect("challenge runs");

        assert_eq!(resolved, Some(credential));
        // No cached credential, so the chain skipped refresh and went
        // silent -> prompt
        assert_eq!(gateway.refresh_count.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.silent_count.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.prompt_count.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_suppresses_same_resource() {
        let gateway = Arc::new(MockGateway {
            prompt_outcome: Some(SignInOutcome::Cancelled),
            ..Default::default()
        });
        let coordinator = coordinator_with(Arc::clone(&gateway), short_window_config());
        let url = "https://maps.example.com/arcgis/rest/services/Secure/MapServer";

        let first = coordinator
            .challenge(url, ChallengeOptions::default())
            .await
            .expect("challenge runs");
        assert!(first.is_none());
        assert_eq!(gateway.prompt_count.load(Ordering::SeqCst), 1);

        // Same resource inside the window: no second prompt
        let second = coordinator
            .challenge(url, ChallengeOptions::default())
            .await
            .expect("challenge runs");
        assert!(second.is_none());
        assert_eq!(gateway.prompt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_does_not_suppress_other_paths() {
        let gateway = Arc::new(MockGateway {
            prompt_outcome: Some(SignInOutcome::Cancelled),
            ..Default::default()
        });
        let coordinator = coordinator_with(Arc::clone(&gateway), short_window_config());

        coordinator
            .challenge(
                "https://maps.example.com/arcgis/rest/services/A/MapServer",
                ChallengeOptions::default(),
            )
            .await
            .expect("challenge runs");

        coordinator
            .challenge(
                "https://maps.example.com/arcgis/rest/services/B/MapServer",
                ChallengeOptions::default(),
            )
            .await
            .expect("challenge runs");

        // Different path on the same domain prompts again
        assert_eq!(gateway.prompt_count.load(Ordering::SeqCst), 2);
    }
}
