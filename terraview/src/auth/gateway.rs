//! Identity provider seam.

use super::cache::Credential;
use crate::service::{BoxFuture, ServiceError};

/// Which interactive sign-in experience to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInFlow {
    /// Portal-hosted flow, for services living under the configured
    /// portal endpoint.
    Portal,
    /// Direct token prompt against the secured server itself.
    Server,
}

/// Result of an interactive sign-in.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// The user completed the flow and a credential was minted.
    SignedIn(Credential),
    /// The user dismissed the prompt.
    Cancelled,
}

/// Bridge to the platform identity machinery.
///
/// The challenge coordinator walks these three strategies in order of
/// increasing user disruption: refresh an existing credential, mint one
/// silently, and only then put a prompt on screen.
pub trait IdentityGateway: Send + Sync {
    /// Mint a token for `url` from a credential already held, without
    /// user interaction.
    fn refresh_token(
        &self,
        url: &str,
        credential: &Credential,
    ) -> BoxFuture<'_, Result<Credential, ServiceError>>;

    /// Mint a token for `url` with no prior credential and no UI
    /// (integrated/platform auth).
    fn silent_token(&self, url: &str) -> BoxFuture<'_, Result<Credential, ServiceError>>;

    /// Run the interactive sign-in flow for `url`.
    fn prompt(
        &self,
        url: &str,
        flow: SignInFlow,
    ) -> BoxFuture<'_, Result<SignInOutcome, ServiceError>>;
}
