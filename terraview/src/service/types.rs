//! Value types exchanged with the external service boundary.

use crate::geo::{Extent, SpatialReference};
use std::fmt;

/// Linear units a map service measures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapUnits {
    Meters,
    Feet,
    DecimalDegrees,
}

impl fmt::Display for MapUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MapUnits::Meters => "meters",
            MapUnits::Feet => "feet",
            MapUnits::DecimalDegrees => "decimal degrees",
        };
        f.write_str(name)
    }
}

/// Descriptive metadata for a map service endpoint.
///
/// Services are free to omit extents and units; the orchestration core
/// degrades per field rather than rejecting the whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMetadata {
    /// Coordinate system the service publishes in.
    pub spatial_reference: SpatialReference,
    /// Extent the service suggests as a starting view.
    pub initial_extent: Option<Extent>,
    /// Extent of everything the service covers.
    pub full_extent: Option<Extent>,
    /// Whether the service ships pre-rendered tiles. Only cached
    /// services can back a basemap.
    pub is_cached: bool,
    /// Measurement units, when the service declares them.
    pub units: Option<MapUnits>,
}

/// A resolved style a layer draws with.
///
/// The core never renders; it only needs to know whether a layer has a
/// style and which geometry kind that style was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderer {
    /// Style identifier as the provider names it.
    pub name: String,
    /// Geometry kind the style applies to.
    pub geometry: crate::geo::GeometryKind,
}
