//! Service error types.

use thiserror::Error;

/// Errors surfaced by the external service boundary.
///
/// Every variant carries the URL of the failing endpoint; user-facing
/// failure messages name the service that broke.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// The endpoint could not be reached.
    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// The endpoint answered with something unusable.
    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// The endpoint does not support the requested operation.
    #[error("Unsupported operation on {url}: {reason}")]
    Unsupported { url: String, reason: String },

    /// The endpoint refused the request (authorization).
    #[error("Access denied by {url}")]
    Denied { url: String },

    /// The request did not complete in time.
    #[error("Request to {url} timed out")]
    Timeout { url: String },
}

impl ServiceError {
    /// URL of the endpoint that produced this error.
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. }
            | Self::InvalidResponse { url, .. }
            | Self::Unsupported { url, .. }
            | Self::Denied { url }
            | Self::Timeout { url } => url,
        }
    }
}
