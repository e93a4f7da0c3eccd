//! Basemap catalog entry types.

use std::fmt;

/// What kind of data source backs a basemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseMapKind {
    /// Tiled ArcGIS server endpoint.
    ArcGisTiled,
    /// Bing Maps imagery set.
    Bing,
    /// Anything else; usable only if its service reports itself cached.
    #[default]
    Other,
}

impl BaseMapKind {
    /// Canonical catalog label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            BaseMapKind::ArcGisTiled => "ArcGISTiledMapService",
            BaseMapKind::Bing => "BingMaps",
            BaseMapKind::Other => "Other",
        }
    }

    /// Parse a catalog label, tolerating the spellings older catalogs
    /// used. Unknown labels come back as [`BaseMapKind::Other`].
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_ascii_lowercase();
        if lower.contains("bing") {
            BaseMapKind::Bing
        } else if lower.contains("arcgis") || lower.contains("tiled") {
            BaseMapKind::ArcGisTiled
        } else {
            BaseMapKind::Other
        }
    }

    /// Whether two basemaps of this kind can swap styles in place,
    /// without touching extents or spatial references.
    pub fn supports_style_switch(&self) -> bool {
        matches!(self, BaseMapKind::Bing)
    }
}

impl fmt::Display for BaseMapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A basemap descriptor from the catalog.
///
/// Selecting one of these is the intent for a basemap switch; the
/// descriptor itself never becomes part of the map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BaseMapInfo {
    /// Human-readable name shown in the gallery.
    pub display_name: String,
    /// Stable identifier within the catalog.
    pub name: String,
    /// Gallery thumbnail location.
    pub thumbnail: String,
    /// Data source kind.
    pub kind: BaseMapKind,
    /// Service endpoint.
    pub url: String,
    /// Whether requests should be routed through the configured proxy.
    pub use_proxy: bool,
}

impl BaseMapInfo {
    /// Create a descriptor whose display name equals its name.
    pub fn new(name: impl Into<String>, kind: BaseMapKind, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            thumbnail: String::new(),
            kind,
            url: url.into(),
            use_proxy: false,
        }
    }
}
