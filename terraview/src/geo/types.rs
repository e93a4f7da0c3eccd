//! Spatial type definitions

use std::collections::BTreeMap;
use std::fmt;

/// WGS 84 geographic coordinate system.
pub const WGS84: SpatialReference = SpatialReference::new(4326);

/// WGS 84 Web Mercator (auxiliary sphere).
pub const WEB_MERCATOR: SpatialReference = SpatialReference::new(3857);

/// Legacy well-known IDs that designate the same Web Mercator projection.
const WEB_MERCATOR_ALIASES: [i32; 3] = [3857, 102100, 102113];

/// A spatial reference system, identified by its well-known ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpatialReference {
    wkid: i32,
}

impl SpatialReference {
    /// Creates a spatial reference from a well-known ID.
    pub const fn new(wkid: i32) -> Self {
        Self { wkid }
    }

    /// Returns the well-known ID.
    pub fn wkid(&self) -> i32 {
        self.wkid
    }

    /// Checks whether two references designate the same coordinate system.
    ///
    /// Unlike `==`, this treats the legacy Web Mercator IDs (102100, 102113)
    /// and 3857 as equivalent, which is what basemap reconciliation needs.
    pub fn equivalent_to(&self, other: &SpatialReference) -> bool {
        if self.wkid == other.wkid {
            return true;
        }
        WEB_MERCATOR_ALIASES.contains(&self.wkid) && WEB_MERCATOR_ALIASES.contains(&other.wkid)
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wkid:{}", self.wkid)
    }
}

/// A rectangular extent in a given spatial reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub spatial_reference: SpatialReference,
}

impl Extent {
    /// Creates a new extent.
    pub fn new(
        xmin: f64,
        ymin: f64,
        xmax: f64,
        ymax: f64,
        spatial_reference: SpatialReference,
    ) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            spatial_reference,
        }
    }

    /// Width of the extent in map units.
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height of the extent in map units.
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Checks whether `other` lies entirely within this extent.
    ///
    /// Containment is inclusive of edges. Spatial references are not
    /// compared; callers reconcile references before asking.
    pub fn contains(&self, other: &Extent) -> bool {
        other.xmin >= self.xmin
            && other.ymin >= self.ymin
            && other.xmax <= self.xmax
            && other.ymax <= self.ymax
    }

    /// Checks whether the two extents overlap at all.
    pub fn intersects(&self, other: &Extent) -> bool {
        self.xmin <= other.xmax
            && self.xmax >= other.xmin
            && self.ymin <= other.ymax
            && self.ymax >= other.ymin
    }

    /// Returns the overlapping rectangle, or `None` if the extents are
    /// disjoint. The result carries this extent's spatial reference.
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }
        Some(Extent {
            xmin: self.xmin.max(other.xmin),
            ymin: self.ymin.max(other.ymin),
            xmax: self.xmax.min(other.xmax),
            ymax: self.ymax.min(other.ymax),
            spatial_reference: self.spatial_reference,
        })
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}, {:.2}, {:.2}] {}",
            self.xmin, self.ymin, self.xmax, self.ymax, self.spatial_reference
        )
    }
}

/// The renderable geometry kind of a layer or feature.
///
/// A layer whose kind cannot be determined keeps `None` in its geometry
/// slot and is surfaced as an explicit error rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Polyline,
    Polygon,
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryKind::Point => "point",
            GeometryKind::Polyline => "polyline",
            GeometryKind::Polygon => "polygon",
        };
        f.write_str(name)
    }
}

/// A single renderable feature.
///
/// The orchestration core never inspects coordinates; it only needs the
/// geometry kind (for renderer defaults), the coordinate reference (to
/// decide whether reprojection must be scheduled) and the attribute keys
/// (for field inference).
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Geometry kind of this feature.
    pub geometry: GeometryKind,
    /// Coordinate system the feature's geometry is expressed in.
    pub spatial_reference: SpatialReference,
    /// Attribute values keyed by field name.
    pub attributes: BTreeMap<String, String>,
}

impl Feature {
    /// Creates a feature with no attributes.
    pub fn new(geometry: GeometryKind, spatial_reference: SpatialReference) -> Self {
        Self {
            geometry,
            spatial_reference,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute value, builder style.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Field metadata for a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name as declared by the service or inferred from data.
    pub name: String,
    /// Display alias; equals the name for inferred fields.
    pub alias: String,
}

impl Field {
    /// Creates a field whose alias equals its name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
        }
    }
}
