//! Spatial primitives for the orchestration core.
//!
//! Provides the small set of geometry types the view orchestration needs:
//! spatial reference identifiers, rectangular extents, geometry kinds and
//! features. Everything heavier (projection math, geodesics) lives behind
//! the [`GeometryService`](crate::service::GeometryService) boundary.

mod types;

pub use types::{
    Extent, Feature, Field, GeometryKind, SpatialReference, WEB_MERCATOR, WGS84,
};
