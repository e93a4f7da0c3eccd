//! Error types for challenge mediation.

use thiserror::Error;

/// Errors that can escape the challenge pipeline.
///
/// Probing failures never appear here: they are swallowed and the next
/// strategy in the fallback chain is tried. Only a malformed challenge
/// URL or a hard interactive sign-in failure reaches the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    /// Challenge URL could not be parsed.
    #[error("Invalid challenge URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// Interactive sign-in failed for a reason other than cancellation.
    #[error("Sign-in failed for {url}: {reason}")]
    SignInFailed { url: String, reason: String },
}
