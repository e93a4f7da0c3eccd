//! Layer types and per-layer state.

use crate::catalog::BaseMapInfo;
use crate::geo::{Feature, Field, GeometryKind, SpatialReference};
use crate::service::Renderer;
use std::fmt;
use std::sync::Mutex;

/// What backs a layer's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Feature service; the service reprojects its own features.
    Feature,
    /// Pre-rendered tiles at fixed resolutions. Cannot be reprojected
    /// in place.
    Tiled,
    /// In-memory graphics owned by the client.
    Graphics,
    /// In-memory point-cluster ("heat") layer.
    Cluster,
}

impl LayerKind {
    /// Whether the layer serves fixed-resolution tiles and therefore
    /// cannot survive a spatial reference change.
    pub fn is_cached(&self) -> bool {
        matches!(self, LayerKind::Tiled)
    }
}

/// Initialization state of a layer.
///
/// ```text
/// Uninitialized -> Initializing -> (GeometryUnknown | GeometryKnown) -> Ready
///                       '-------------------------------------------> Failed
/// ```
///
/// `Ready` and `Failed` are both terminal and both count as "accounted
/// for": a failed layer never blocks overall readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Uninitialized,
    Initializing,
    /// Initialization finished but the geometry kind could not be
    /// determined; the layer is hidden and carries an error.
    GeometryUnknown,
    /// Geometry kind determined; styling in progress.
    GeometryKnown,
    Ready,
    Failed,
}

impl LayerState {
    /// Whether the layer has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        matches!(self, LayerState::Ready | LayerState::Failed)
    }
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerState::Uninitialized => "uninitialized",
            LayerState::Initializing => "initializing",
            LayerState::GeometryUnknown => "geometry-unknown",
            LayerState::GeometryKnown => "geometry-known",
            LayerState::Ready => "ready",
            LayerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Payload of a completed layer load.
#[derive(Debug, Clone, Default)]
pub struct LayerInitData {
    /// Geometry kind the service declared, if it declared one.
    pub declared_geometry: Option<GeometryKind>,
    /// Fields the service declared; empty means undeclared.
    pub declared_fields: Vec<Field>,
    /// Features delivered with the load.
    pub features: Vec<Feature>,
}

impl LayerInitData {
    /// Set the declared geometry kind, builder style.
    pub fn with_geometry(mut self, geometry: GeometryKind) -> Self {
        self.declared_geometry = Some(geometry);
        self
    }

    /// Set the declared fields, builder style.
    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.declared_fields = fields;
        self
    }

    /// Set the delivered features, builder style.
    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }
}

/// Mutable per-layer state.
#[derive(Debug)]
struct LayerInner {
    state: LayerState,
    geometry: Option<GeometryKind>,
    fields: Vec<Field>,
    renderer: Option<Renderer>,
    visible: bool,
    error: Option<String>,
    /// Coordinate system this layer's data currently lives in.
    spatial_reference: Option<SpatialReference>,
    features: Vec<Feature>,
    /// Descriptor a basemap layer was built from.
    basemap: Option<BaseMapInfo>,
    /// Set the first time a reprojection is scheduled for this layer.
    reprojection_scheduled: bool,
}

impl LayerInner {
    fn new() -> Self {
        Self {
            state: LayerState::Uninitialized,
            geometry: None,
            fields: Vec::new(),
            renderer: None,
            visible: true,
            error: None,
            spatial_reference: None,
            features: Vec::new(),
            basemap: None,
            reprojection_scheduled: false,
        }
    }
}

/// A map layer.
///
/// Identity (`id`, `kind`, basemap flag, source URL) is fixed at
/// construction; everything the lifecycle manager and basemap switcher
/// compute lives behind a `Mutex` so independent async chains can touch
/// different layers freely.
#[derive(Debug)]
pub struct Layer {
    id: String,
    kind: LayerKind,
    is_basemap: bool,
    url: Option<String>,
    inner: Mutex<LayerInner>,
}

impl Layer {
    /// Create a feature-service layer.
    pub fn feature(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::operational(id, LayerKind::Feature, Some(url.into()))
    }

    /// Create a cached (tiled) operational layer.
    pub fn tiled(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::operational(id, LayerKind::Tiled, Some(url.into()))
    }

    /// Create an in-memory graphics layer.
    pub fn graphics(id: impl Into<String>, features: Vec<Feature>) -> Self {
        let layer = Self::operational(id, LayerKind::Graphics, None);
        layer.inner.lock().unwrap().features = features;
        layer
    }

    /// Create an in-memory point-cluster layer.
    pub fn cluster(id: impl Into<String>, features: Vec<Feature>) -> Self {
        let layer = Self::operational(id, LayerKind::Cluster, None);
        layer.inner.lock().unwrap().features = features;
        layer
    }

    /// Create the basemap layer for a catalog descriptor.
    ///
    /// Basemap layers are born `Ready`: their service metadata was
    /// already fetched by the switch that created them.
    pub fn basemap(info: &BaseMapInfo, spatial_reference: SpatialReference) -> Self {
        let mut inner = LayerInner::new();
        inner.state = LayerState::Ready;
        inner.spatial_reference = Some(spatial_reference);
        inner.basemap = Some(info.clone());
        Self {
            id: info.name.clone(),
            kind: LayerKind::Tiled,
            is_basemap: true,
            url: Some(info.url.clone()),
            inner: Mutex::new(inner),
        }
    }

    fn operational(id: impl Into<String>, kind: LayerKind, url: Option<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            is_basemap: false,
            url,
            inner: Mutex::new(LayerInner::new()),
        }
    }

    /// Layer identifier, unique within a map.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// What backs this layer.
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Whether this layer occupies the basemap slot.
    pub fn is_basemap(&self) -> bool {
        self.is_basemap
    }

    /// Source URL, for service-backed layers.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Current initialization state.
    pub fn state(&self) -> LayerState {
        self.inner.lock().unwrap().state
    }

    pub(crate) fn set_state(&self, state: LayerState) {
        self.inner.lock().unwrap().state = state;
    }

    /// Computed geometry kind, once known.
    pub fn geometry(&self) -> Option<GeometryKind> {
        self.inner.lock().unwrap().geometry
    }

    pub(crate) fn set_geometry(&self, geometry: GeometryKind) {
        self.inner.lock().unwrap().geometry = Some(geometry);
    }

    /// Field metadata, server-declared or inferred.
    pub fn fields(&self) -> Vec<Field> {
        self.inner.lock().unwrap().fields.clone()
    }

    pub(crate) fn set_fields(&self, fields: Vec<Field>) {
        self.inner.lock().unwrap().fields = fields;
    }

    /// Assigned renderer, if any.
    pub fn renderer(&self) -> Option<Renderer> {
        self.inner.lock().unwrap().renderer.clone()
    }

    /// Assign a renderer explicitly. Layers with one keep it; the
    /// lifecycle manager only fills the gap when none was assigned.
    pub fn set_renderer(&self, renderer: Renderer) {
        self.inner.lock().unwrap().renderer = Some(renderer);
    }

    /// Whether the layer should be drawn.
    pub fn is_visible(&self) -> bool {
        self.inner.lock().unwrap().visible
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        self.inner.lock().unwrap().visible = visible;
    }

    /// Error recorded against this layer, if any.
    pub fn error(&self) -> Option<String> {
        self.inner.lock().unwrap().error.clone()
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        self.inner.lock().unwrap().error = Some(message.into());
    }

    /// Coordinate system this layer's data currently lives in.
    pub fn spatial_reference(&self) -> Option<SpatialReference> {
        self.inner.lock().unwrap().spatial_reference
    }

    pub(crate) fn set_spatial_reference(&self, spatial_reference: SpatialReference) {
        self.inner.lock().unwrap().spatial_reference = Some(spatial_reference);
    }

    /// Snapshot of the layer's features.
    pub fn features(&self) -> Vec<Feature> {
        self.inner.lock().unwrap().features.clone()
    }

    pub(crate) fn set_features(&self, features: Vec<Feature>) {
        self.inner.lock().unwrap().features = features;
    }

    pub(crate) fn extend_features(&self, features: Vec<Feature>) {
        self.inner.lock().unwrap().features.extend(features);
    }

    /// The catalog descriptor a basemap layer was built from.
    pub fn basemap_info(&self) -> Option<BaseMapInfo> {
        self.inner.lock().unwrap().basemap.clone()
    }

    /// Swap the basemap descriptor in place (Bing style switch).
    pub(crate) fn set_basemap_info(&self, info: BaseMapInfo) {
        self.inner.lock().unwrap().basemap = Some(info);
    }

    /// Whether a reprojection has been scheduled for this layer.
    pub fn reprojection_scheduled(&self) -> bool {
        self.inner.lock().unwrap().reprojection_scheduled
    }

    /// Mark the one-time reprojection as scheduled. Returns `false` if
    /// it was already marked, so callers schedule exactly once.
    pub(crate) fn mark_reprojection_scheduled(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.reprojection_scheduled {
            return false;
        }
        inner.reprojection_scheduled = true;
        true
    }
}
