//! Process-wide credential cache.
//!
//! Holds at most one canonical credential per network domain. The cache
//! is shared between the challenge coordinator (which populates it) and
//! any code that wants to probe whether a domain is already signed in.

use dashmap::DashMap;

/// An authentication credential for a secured network domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Network domain (host) the credential is scoped to.
    pub domain: String,
    /// URL the credential was originally minted for.
    pub url: String,
    /// Opaque access token.
    pub token: String,
}

impl Credential {
    /// Create a credential.
    pub fn new(
        domain: impl Into<String>,
        url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            url: url.into(),
            token: token.into(),
        }
    }
}

/// Shared credential set, keyed by domain.
///
/// Concurrent challenge chains read and write this freely; `DashMap`
/// keeps individual operations atomic without a cache-wide lock.
#[derive(Debug, Default)]
pub struct CredentialCache {
    by_domain: DashMap<String, Credential>,
}

impl CredentialCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            by_domain: DashMap::new(),
        }
    }

    /// Insert or replace the canonical credential for its domain.
    pub fn add(&self, credential: Credential) {
        self.by_domain.insert(credential.domain.clone(), credential);
    }

    /// Canonical credential for `domain`, if one is held.
    pub fn find(&self, domain: &str) -> Option<Credential> {
        self.by_domain.get(domain).map(|entry| entry.clone())
    }

    /// Remove the credential for `domain`. Returns whether one existed.
    pub fn remove(&self, domain: &str) -> bool {
        self.by_domain.remove(domain).is_some()
    }

    /// Drop every credential.
    pub fn clear(&self) {
        self.by_domain.clear();
    }

    /// Number of domains with a credential.
    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    /// Whether the cache holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }
}
