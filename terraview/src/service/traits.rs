//! Service trait definitions for dependency injection.

use super::error::ServiceError;
use super::types::{Renderer, ServiceMetadata};
use crate::geo::{Extent, Feature, GeometryKind, SpatialReference};

/// Boxed future for dyn-compatible async trait methods.
pub use futures::future::BoxFuture;

/// Fetches descriptive metadata for map service endpoints.
///
/// The basemap switcher asks this once per switch (plus silent retries
/// when the first answer omits map units).
pub trait MapService: Send + Sync {
    /// Fetch metadata for the service at `url`.
    fn fetch_metadata(&self, url: &str) -> BoxFuture<'_, Result<ServiceMetadata, ServiceError>>;
}

/// Reprojects coordinates between spatial reference systems.
///
/// Calls are fire-and-forget from the caller's perspective: layers keep
/// making progress while a projection is in flight.
pub trait GeometryService: Send + Sync {
    /// Reproject a set of features into `target`.
    fn project(
        &self,
        features: Vec<Feature>,
        target: SpatialReference,
    ) -> BoxFuture<'_, Result<Vec<Feature>, ServiceError>>;

    /// Reproject a single extent into `target`.
    fn project_extent(
        &self,
        extent: Extent,
        target: SpatialReference,
    ) -> BoxFuture<'_, Result<Extent, ServiceError>>;
}

/// Supplies default styles for layers that arrive without one.
pub trait StyleProvider: Send + Sync {
    /// Produce the default renderer for the given geometry kind.
    fn default_renderer(
        &self,
        geometry: GeometryKind,
    ) -> BoxFuture<'_, Result<Renderer, ServiceError>>;
}

/// Asks the user to approve a disruptive operation.
///
/// The switcher consults this before dropping cached operational layers
/// that cannot survive a reprojection.
pub trait ConfirmationGate: Send + Sync {
    /// Present `message` and return `true` if the user approves.
    fn confirm(&self, message: &str) -> BoxFuture<'_, bool>;
}

/// Gate that approves everything. Useful for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct AlwaysConfirm;

impl ConfirmationGate for AlwaysConfirm {
    fn confirm(&self, _message: &str) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}
