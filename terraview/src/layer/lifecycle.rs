//! Drives attached layers from `Initializing` to a terminal state.
//!
//! For every attached layer the manager waits for its load to finish,
//! then classifies what arrived:
//!
//! ```text
//!   attach()                 complete_initialization(data)
//!     |                                 |
//!     v                                 v
//!   Initializing --> GeometryUnknown (hidden, error recorded)
//!        |       '-> GeometryKnown  (fields, default style, features)
//!        |                                 |
//!        |          reprojection scheduled if coordinates differ
//!        |                                 |
//!        '---------------> Ready / Failed <'
//! ```
//!
//! Every terminal transition reports to the initialization tracker, and
//! once the last attached layer lands (with the map's spatial reference
//! known) the layer set is announced exactly once.

use crate::geo::{Feature, Field, SpatialReference};
use crate::layer::{Layer, LayerInitData, LayerState};
use crate::map::Map;
use crate::runtime::{EventSink, InitializationTracker, ViewEvent};
use crate::service::{GeometryService, StyleProvider};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug)]
struct LifecycleInner {
    /// Layers this manager has taken responsibility for.
    attached: Vec<Arc<Layer>>,
    /// Latched once the full layer set has been announced.
    layers_announced: bool,
}

/// Subscribes attached layers to their load outcomes and reports
/// aggregate progress to the initialization tracker.
pub struct LayerLifecycleManager {
    map: Arc<Map>,
    styles: Arc<dyn StyleProvider>,
    geometry: Arc<dyn GeometryService>,
    tracker: Arc<InitializationTracker>,
    events: Arc<dyn EventSink>,
    inner: Mutex<LifecycleInner>,
}

impl LayerLifecycleManager {
    pub fn new(
        map: Arc<Map>,
        styles: Arc<dyn StyleProvider>,
        geometry: Arc<dyn GeometryService>,
        tracker: Arc<InitializationTracker>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            map,
            styles,
            geometry,
            tracker,
            events,
            inner: Mutex::new(LifecycleInner {
                attached: Vec::new(),
                layers_announced: false,
            }),
        }
    }

    /// Take responsibility for a layer: it moves to `Initializing` and
    /// counts toward readiness until a terminal state is reported.
    pub fn attach(&self, layer: &Arc<Layer>) {
        layer.set_state(LayerState::Initializing);
        self.tracker.register_pending();
        self.inner.lock().unwrap().attached.push(Arc::clone(layer));
        debug!(layer = %layer.id(), kind = ?layer.kind(), "Layer attached");
    }

    /// Process a successful load for `layer`.
    ///
    /// Classification never blocks other layers: the only await points
    /// are the style-provider lookup and nothing else. Reprojection is
    /// scheduled fire-and-forget.
    pub async fn complete_initialization(&self, layer: &Arc<Layer>, data: LayerInitData) {
        let geometry = data
            .declared_geometry
            .or_else(|| data.features.first().map(|feature| feature.geometry));

        match geometry {
            None => {
                warn!(layer = %layer.id(), "Layer has an unspecified geometry type, hiding it");
                layer.set_visible(false);
                layer.set_error("unspecified geometry type");
                layer.set_state(LayerState::GeometryUnknown);
            }
            Some(kind) => {
                layer.set_geometry(kind);
                layer.set_state(LayerState::GeometryKnown);
                trace!(layer = %layer.id(), geometry = %kind, "Layer geometry classified");

                let fields = if data.declared_fields.is_empty() {
                    Self::infer_fields(&data)
                } else {
                    data.declared_fields.clone()
                };
                layer.set_fields(fields);

                if layer.renderer().is_none() {
                    match self.styles.default_renderer(kind).await {
                        Ok(renderer) => layer.set_renderer(renderer),
                        Err(err) => {
                            // Styling is best effort; an unstyled layer
                            // still completes.
                            warn!(layer = %layer.id(), %err, "Default style lookup failed");
                        }
                    }
                }
            }
        }

        if !data.features.is_empty() {
            layer.extend_features(data.features);
        }
        self.reconcile_spatial_reference(layer);

        layer.set_state(LayerState::Ready);
        debug!(layer = %layer.id(), "Layer ready");
        self.tracker.complete();
        self.announce_if_complete();
    }

    /// Process a failed load for `layer`. The layer is marked `Failed`
    /// but still counts as accounted for, so readiness proceeds.
    pub fn fail_initialization(&self, layer: &Arc<Layer>, message: &str) {
        error!(layer = %layer.id(), message, "Layer initialization failed");
        layer.set_error(message);
        layer.set_state(LayerState::Failed);
        self.tracker.complete_with_error(message);
        self.announce_if_complete();
    }

    /// Process a post-initialization data update: newly arrived features
    /// may resolve a previously unknown geometry kind or supply
    /// inferable fields.
    pub async fn complete_update(&self, layer: &Arc<Layer>, features: Vec<Feature>) {
        if !features.is_empty() {
            layer.extend_features(features);
        }

        if layer.geometry().is_none() {
            if let Some(kind) = layer.features().first().map(|feature| feature.geometry) {
                info!(layer = %layer.id(), geometry = %kind, "Update resolved layer geometry");
                layer.set_geometry(kind);
                layer.set_visible(true);

                if layer.renderer().is_none() {
                    match self.styles.default_renderer(kind).await {
                        Ok(renderer) => layer.set_renderer(renderer),
                        Err(err) => {
                            warn!(layer = %layer.id(), %err, "Default style lookup failed");
                        }
                    }
                }
            }
        }

        if layer.fields().is_empty() {
            if let Some(feature) = layer.features().first() {
                let fields: Vec<Field> = feature.attributes.keys().map(Field::named).collect();
                layer.set_fields(fields);
            }
        }

        self.reconcile_spatial_reference(layer);
    }

    /// Announce the layer set if every attached layer is accounted for
    /// and the map's spatial reference is known. Safe to call any time;
    /// the announcement happens at most once.
    pub fn announce_if_complete(&self) {
        if self.map.spatial_reference().is_none() {
            return;
        }
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.layers_announced {
                return;
            }
            let all_complete = inner.attached.iter().all(|layer| layer.state().is_complete());
            if !all_complete {
                return;
            }
            inner.layers_announced = true;
        }
        info!("All attached layers accounted for");
        self.tracker.notify_layers_ready();
        self.events.emit(ViewEvent::MapLayersInitialized);
    }

    /// Number of layers this manager is responsible for.
    pub fn attached_count(&self) -> usize {
        self.inner.lock().unwrap().attached.len()
    }

    fn infer_fields(data: &LayerInitData) -> Vec<Field> {
        data.features
            .first()
            .map(|feature| feature.attributes.keys().map(Field::named).collect())
            .unwrap_or_default()
    }

    /// Tag the layer with the map's spatial reference, scheduling a
    /// one-time feature reprojection when coordinates disagree.
    fn reconcile_spatial_reference(&self, layer: &Arc<Layer>) {
        let Some(map_sr) = self.map.spatial_reference() else {
            return;
        };
        let mismatch = layer
            .features()
            .iter()
            .any(|feature| !feature.spatial_reference.equivalent_to(&map_sr));
        if mismatch {
            self.schedule_reprojection(layer, map_sr);
        } else if layer.spatial_reference().is_none() {
            layer.set_spatial_reference(map_sr);
        }
    }

    fn schedule_reprojection(&self, layer: &Arc<Layer>, target: SpatialReference) {
        if !layer.mark_reprojection_scheduled() {
            return;
        }
        debug!(layer = %layer.id(), target = %target, "Scheduling feature reprojection");

        let geometry = Arc::clone(&self.geometry);
        let layer = Arc::clone(layer);
        tokio::spawn(async move {
            let features = layer.features();
            match geometry.project(features, target).await {
                Ok(projected) => {
                    layer.set_features(projected);
                    layer.set_spatial_reference(target);
                    trace!(layer = %layer.id(), "Feature reprojection complete");
                }
                Err(err) => {
                    warn!(layer = %layer.id(), %err, "Feature reprojection failed");
                }
            }
        });
    }
}

impl std::fmt::Debug for LayerLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("LayerLifecycleManager")
            .field("attached", &inner.attached.len())
            .field("layers_announced", &inner.layers_announced)
            .finish_non_exhaustive()
    }
}
