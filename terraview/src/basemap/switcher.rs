//! Basemap replacement protocol.
//!
//! Swapping the basemap means reconciling two coordinate systems while
//! keeping every operational layer intact:
//!
//! ```text
//!   switch_basemap(target)
//!     |
//!     |-- in-place style switch?  --> swap descriptor, done
//!     |
//!     |-- fetch service metadata  --> not cached? fail, map untouched
//!     |
//!     |-- same spatial reference  --> maybe snap to full extent
//!     |-- different reference     --> confirm cached-layer removal,
//!     |                               reproject current extent
//!     |
//!     |-- atomic swap (notifications suppressed):
//!     |     stash operational layers, clear, set reference + extent,
//!     |     insert new basemap first, restore operational layers
//!     |
//!     '-- reproject in-memory layers, restore selection, re-attach
//!         behaviors, emit MapRecreated + BaseMapChangeComplete
//! ```
//!
//! Failure at any decision point leaves the previous map untouched and
//! raises `BaseMapChangeFailed`; only a completed swap mutates state.

use crate::catalog::BaseMapInfo;
use crate::config::ViewConfig;
use crate::geo::{Extent, SpatialReference};
use crate::layer::{Layer, LayerKind};
use crate::map::{Map, MapBehavior};
use crate::runtime::{EventSink, ViewEvent};
use crate::service::{ConfirmationGate, GeometryService, MapService, ServiceError, ServiceMetadata};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Errors that abort a basemap switch.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Only tiled services can back a basemap.
    #[error("service at {url} is not cached and cannot serve as a basemap")]
    NotCacheable { url: String },

    /// The target service's metadata could not be fetched.
    #[error("failed to fetch metadata for {url}")]
    MetadataFetch {
        url: String,
        #[source]
        source: ServiceError,
    },

    /// The user declined removal of cached operational layers.
    #[error("removal of cached operational layers was declined")]
    Declined,

    /// The current extent could not be projected into the target
    /// reference.
    #[error("failed to reproject the current extent")]
    ExtentProjection {
        #[source]
        source: ServiceError,
    },
}

/// Replaces the basemap while preserving operational layers, selection,
/// and attached behaviors.
pub struct BasemapSwitcher {
    map: Arc<Map>,
    services: Arc<dyn MapService>,
    geometry: Arc<dyn GeometryService>,
    confirm: Arc<dyn ConfirmationGate>,
    events: Arc<dyn EventSink>,
    behaviors: Mutex<Vec<Arc<dyn MapBehavior>>>,
    map_units_retries: u32,
}

impl BasemapSwitcher {
    pub fn new(
        config: &ViewConfig,
        map: Arc<Map>,
        services: Arc<dyn MapService>,
        geometry: Arc<dyn GeometryService>,
        confirm: Arc<dyn ConfirmationGate>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            map,
            services,
            geometry,
            confirm,
            events,
            behaviors: Mutex::new(Vec::new()),
            map_units_retries: config.map_units_retries,
        }
    }

    /// Attach a behavior to the map now and after every future switch.
    pub fn register_behavior(&self, behavior: Arc<dyn MapBehavior>) {
        behavior.attach(&self.map);
        debug!(behavior = behavior.name(), "Behavior attached");
        self.behaviors.lock().unwrap().push(behavior);
    }

    /// Replace the current basemap with `target`.
    pub async fn switch_basemap(&self, target: &BaseMapInfo) -> Result<(), SwitchError> {
        info!(basemap = %target.name, url = %target.url, "Basemap switch requested");

        if let Some(existing) = self.style_switch_candidate(target) {
            info!(basemap = %target.name, "Switching basemap style in place");
            existing.set_basemap_info(target.clone());
            self.events.emit(ViewEvent::BaseMapChangeComplete {
                name: target.name.clone(),
            });
            return Ok(());
        }

        let metadata = match self.services.fetch_metadata(&target.url).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(url = %target.url, %err, "Basemap metadata fetch failed");
                self.fail(target, err.to_string());
                return Err(SwitchError::MetadataFetch {
                    url: target.url.clone(),
                    source: err,
                });
            }
        };
        if !metadata.is_cached {
            warn!(url = %target.url, "Service is not cached, rejecting basemap");
            self.fail(target, format!("service at {} is not cached", target.url));
            return Err(SwitchError::NotCacheable {
                url: target.url.clone(),
            });
        }

        let target_sr = metadata.spatial_reference;
        let current_sr = self.map.spatial_reference();
        let sr_changed = current_sr
            .map(|sr| !sr.equivalent_to(&target_sr))
            .unwrap_or(false);

        let previous_selection = self.map.selected_layer_id();
        let snapshot = self.map.layers().snapshot();

        let new_extent = if sr_changed {
            self.confirm_cached_layer_removal(&snapshot, target).await?;
            self.cross_reference_extent(target, &metadata, target_sr)
                .await?
        } else {
            Self::same_reference_extent(self.map.extent(), &metadata)
        };

        // Operational layers to carry across. On a reference change,
        // cached ones cannot survive and were confirmed for removal
        // above.
        let preserved: Vec<Arc<Layer>> = snapshot
            .iter()
            .filter(|layer| !layer.is_basemap())
            .filter(|layer| !(sr_changed && layer.kind().is_cached()))
            .cloned()
            .collect();

        let basemap_layer = Arc::new(Layer::basemap(target, target_sr));

        let collection = self.map.layers();
        collection.set_notifications_suppressed(true);
        collection.clear();
        if sr_changed || current_sr.is_none() {
            if let Err(err) = self.map.set_spatial_reference(target_sr) {
                // Cannot happen with the collection empty.
                error!(%err, "Spatial reference change rejected during swap");
            }
        }
        if let Some(extent) = new_extent {
            self.map.set_extent(extent);
        }
        collection.insert_first(Arc::clone(&basemap_layer));
        for layer in &preserved {
            collection.add(Arc::clone(layer));
        }
        collection.set_notifications_suppressed(false);
        debug!(
            basemap = %target.name,
            operational = preserved.len(),
            "Layer collection rebuilt"
        );

        if sr_changed {
            for layer in &preserved {
                if matches!(layer.kind(), LayerKind::Graphics | LayerKind::Cluster) {
                    self.reproject_in_place(layer, target_sr);
                }
            }
        }

        self.resolve_map_units(&metadata, &target.url);
        self.restore_selection(previous_selection, &basemap_layer);
        self.reattach_behaviors();

        self.events.emit(ViewEvent::MapRecreated {
            map: Arc::clone(&self.map),
        });
        self.events.emit(ViewEvent::BaseMapChangeComplete {
            name: target.name.clone(),
        });
        info!(basemap = %target.name, "Basemap switch complete");
        Ok(())
    }

    /// The in-place fast path applies when exactly one basemap layer is
    /// present and both its source and the target support style
    /// switching (Bing style families).
    fn style_switch_candidate(&self, target: &BaseMapInfo) -> Option<Arc<Layer>> {
        if !target.kind.supports_style_switch() {
            return None;
        }
        let basemaps: Vec<Arc<Layer>> = self
            .map
            .layers()
            .snapshot()
            .into_iter()
            .filter(|layer| layer.is_basemap())
            .collect();
        let [only] = basemaps.as_slice() else {
            return None;
        };
        let info = only.basemap_info()?;
        info.kind.supports_style_switch().then(|| Arc::clone(only))
    }

    async fn confirm_cached_layer_removal(
        &self,
        snapshot: &[Arc<Layer>],
        target: &BaseMapInfo,
    ) -> Result<(), SwitchError> {
        let cached: Vec<&str> = snapshot
            .iter()
            .filter(|layer| !layer.is_basemap() && layer.kind().is_cached())
            .map(|layer| layer.id())
            .collect();
        if cached.is_empty() {
            return Ok(());
        }

        let message = format!(
            "The new basemap uses a different coordinate system. These cached layers \
             cannot be reprojected and will be removed: {}. Continue?",
            cached.join(", ")
        );
        if self.confirm.confirm(&message).await {
            info!(layers = ?cached, "Cached operational layer removal confirmed");
            Ok(())
        } else {
            info!("Basemap switch declined by user");
            self.fail(
                target,
                "cached operational layers must be removed before reprojecting".to_string(),
            );
            Err(SwitchError::Declined)
        }
    }

    /// Same reference: snap to the target's full extent when the
    /// current view fits entirely inside it, otherwise keep the view.
    fn same_reference_extent(current: Option<Extent>, metadata: &ServiceMetadata) -> Option<Extent> {
        match (current, metadata.full_extent) {
            (Some(current), Some(full)) if full.contains(&current) => Some(full),
            (Some(current), _) => Some(current),
            (None, full) => metadata.initial_extent.or(full),
        }
    }

    /// Differing references: project the current view into the target
    /// reference and reconcile it against the service's declared
    /// extents.
    async fn cross_reference_extent(
        &self,
        target: &BaseMapInfo,
        metadata: &ServiceMetadata,
        target_sr: SpatialReference,
    ) -> Result<Option<Extent>, SwitchError> {
        let reprojected = match self.map.extent() {
            Some(extent) => match self.geometry.project_extent(extent, target_sr).await {
                Ok(projected) => Some(projected),
                Err(err) => {
                    warn!(%err, "Current extent could not be reprojected");
                    self.fail(target, err.to_string());
                    return Err(SwitchError::ExtentProjection { source: err });
                }
            },
            None => None,
        };
        Ok(Self::choose_cross_extent(
            reprojected,
            metadata.initial_extent,
            metadata.full_extent,
        ))
    }

    fn choose_cross_extent(
        reprojected: Option<Extent>,
        initial: Option<Extent>,
        full: Option<Extent>,
    ) -> Option<Extent> {
        let Some(reprojected) = reprojected else {
            return initial.or(full);
        };
        if let Some(full) = full {
            if full.contains(&reprojected) {
                return Some(full);
            }
        }
        if let Some(initial) = initial {
            if reprojected.intersects(&initial) {
                return reprojected.intersection(&initial);
            }
            return Some(initial);
        }
        full.or(Some(reprojected))
    }

    /// Reproject an in-memory layer's features and retag it. Fire and
    /// forget; feature-service layers reproject on the server and never
    /// come through here.
    fn reproject_in_place(&self, layer: &Arc<Layer>, target: SpatialReference) {
        debug!(layer = %layer.id(), target = %target, "Reprojecting in-memory layer");
        let geometry = Arc::clone(&self.geometry);
        let layer = Arc::clone(layer);
        tokio::spawn(async move {
            let features = layer.features();
            match geometry.project(features, target).await {
                Ok(projected) => {
                    layer.set_features(projected);
                    layer.set_spatial_reference(target);
                    trace!(layer = %layer.id(), "In-memory layer reprojected");
                }
                Err(err) => {
                    warn!(layer = %layer.id(), %err, "In-memory layer reprojection failed");
                }
            }
        });
    }

    /// Resolve map units when the first metadata answer omitted them.
    /// The bounded silent retries run off the switch's critical path;
    /// giving up is not an error.
    fn resolve_map_units(&self, metadata: &ServiceMetadata, url: &str) {
        if let Some(units) = metadata.units {
            self.map.set_map_units(units);
            return;
        }
        let map = Arc::clone(&self.map);
        let services = Arc::clone(&self.services);
        let url = url.to_string();
        let retries = self.map_units_retries;
        tokio::spawn(async move {
            for attempt in 1..=retries {
                match services.fetch_metadata(&url).await {
                    Ok(probe) => {
                        if let Some(units) = probe.units {
                            map.set_map_units(units);
                            trace!(attempt, "Map units resolved on retry");
                            return;
                        }
                    }
                    Err(err) => {
                        trace!(attempt, %err, "Map units probe failed");
                    }
                }
            }
            debug!(url = %url, retries, "Map units unresolved, giving up");
        });
    }

    fn restore_selection(&self, previous: Option<String>, basemap_layer: &Arc<Layer>) {
        let restored = previous.filter(|id| self.map.layers().get(id).is_some());
        match restored {
            Some(id) => {
                trace!(layer = %id, "Selection restored");
                self.map.select_layer(Some(id));
            }
            None => {
                trace!(layer = %basemap_layer.id(), "Selection defaulted to new basemap");
                self.map
                    .select_layer(Some(basemap_layer.id().to_string()));
            }
        }
    }

    fn reattach_behaviors(&self) {
        let behaviors = self.behaviors.lock().unwrap().clone();
        for behavior in behaviors {
            behavior.attach(&self.map);
            trace!(behavior = behavior.name(), "Behavior re-attached");
        }
    }

    fn fail(&self, target: &BaseMapInfo, reason: String) {
        self.events.emit(ViewEvent::BaseMapChangeFailed {
            name: target.name.clone(),
            reason,
        });
    }
}

impl std::fmt::Debug for BasemapSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasemapSwitcher")
            .field("behaviors", &self.behaviors.lock().unwrap().len())
            .field("map_units_retries", &self.map_units_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BaseMapKind;
    use crate::geo::{Feature, GeometryKind, WEB_MERCATOR, WGS84};
    use crate::map::{CollectionChange, CollectionObserver};
    use crate::runtime::NullEventSink;
    use crate::service::{AlwaysConfirm, BoxFuture, MapUnits};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubMapService {
        responses: Mutex<VecDeque<Result<ServiceMetadata, ServiceError>>>,
        fallback: Result<ServiceMetadata, ServiceError>,
        calls: AtomicUsize,
    }

    impl StubMapService {
        fn always(metadata: ServiceMetadata) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: Ok(metadata),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(error: ServiceError) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: Err(error),
                calls: AtomicUsize::new(0),
            })
        }

        fn sequence(
            responses: Vec<Result<ServiceMetadata, ServiceError>>,
            fallback: ServiceMetadata,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                fallback: Ok(fallback),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MapService for StubMapService {
        fn fetch_metadata(
            &self,
            _url: &str,
        ) -> BoxFuture<'_, Result<ServiceMetadata, ServiceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Box::pin(async move { result })
        }
    }

    /// Models projection as an identity transform with a reference
    /// retag, which keeps containment math easy to reason about.
    struct RetagGeometry {
        project_calls: AtomicUsize,
    }

    impl RetagGeometry {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                project_calls: AtomicUsize::new(0),
            })
        }
    }

    impl GeometryService for RetagGeometry {
        fn project(
            &self,
            features: Vec<Feature>,
            target: SpatialReference,
        ) -> BoxFuture<'_, Result<Vec<Feature>, ServiceError>> {
            self.project_calls.fetch_add(1, Ordering::SeqCst);
            let projected: Vec<Feature> = features
                .into_iter()
                .map(|mut feature| {
                    feature.spatial_reference = target;
                    feature
                })
                .collect();
            Box::pin(async move { Ok(projected) })
        }

        fn project_extent(
            &self,
            extent: Extent,
            target: SpatialReference,
        ) -> BoxFuture<'_, Result<Extent, ServiceError>> {
            let mut projected = extent;
            projected.spatial_reference = target;
            Box::pin(async move { Ok(projected) })
        }
    }

    struct Decline;

    impl ConfirmationGate for Decline {
        fn confirm(&self, _message: &str) -> BoxFuture<'_, bool> {
            Box::pin(async { false })
        }
    }

    struct CollectingSink {
        events: Mutex<Vec<ViewEvent>>,
    }

    impl CollectingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn types(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|event| event.event_type())
                .collect()
        }

        fn count_of(&self, event_type: &str) -> usize {
            self.types()
                .iter()
                .filter(|name| **name == event_type)
                .count()
        }
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: ViewEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct CountingObserver {
        changes: AtomicUsize,
    }

    impl CollectionObserver for CountingObserver {
        fn collection_changed(&self, _change: &CollectionChange) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tiled_target(name: &str) -> BaseMapInfo {
        BaseMapInfo::new(
            name,
            BaseMapKind::ArcGisTiled,
            format!("https://tiles.example.com/{name}/MapServer"),
        )
    }

    fn metadata(sr: SpatialReference) -> ServiceMetadata {
        ServiceMetadata {
            spatial_reference: sr,
            initial_extent: Some(Extent::new(-10.0, -10.0, 10.0, 10.0, sr)),
            full_extent: Some(Extent::new(-100.0, -100.0, 100.0, 100.0, sr)),
            is_cached: true,
            units: Some(MapUnits::Meters),
        }
    }

    fn map_with_basemap() -> Arc<Map> {
        let map = Arc::new(Map::new());
        map.set_spatial_reference(WGS84).unwrap();
        map.set_extent(Extent::new(-50.0, -50.0, 50.0, 50.0, WGS84));
        let old = BaseMapInfo::new(
            "old-base",
            BaseMapKind::ArcGisTiled,
            "https://tiles.example.com/old/MapServer",
        );
        map.layers()
            .insert_first(Arc::new(Layer::basemap(&old, WGS84)));
        map
    }

    fn switcher(
        map: &Arc<Map>,
        services: &Arc<StubMapService>,
        geometry: &Arc<RetagGeometry>,
        confirm: Arc<dyn ConfirmationGate>,
        sink: &Arc<CollectingSink>,
    ) -> BasemapSwitcher {
        BasemapSwitcher::new(
            &ViewConfig::default(),
            Arc::clone(map),
            services.clone(),
            geometry.clone(),
            confirm,
            sink.clone(),
        )
    }

    fn layer_order(map: &Map) -> Vec<String> {
        map.layers()
            .snapshot()
            .iter()
            .map(|layer| layer.id().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_uncached_service_fails_without_touching_layers() {
        let map = map_with_basemap();
        map.layers()
            .add(Arc::new(Layer::graphics("sketch", Vec::new())));
        let before = layer_order(&map);

        let mut uncached = metadata(WGS84);
        uncached.is_cached = false;
        let services = StubMapService::always(uncached);
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        let err = switcher.switch_basemap(&tiled_target("streets")).await;
        assert!(matches!(err, Err(SwitchError::NotCacheable { .. })));

        assert_eq!(layer_order(&map), before);
        assert_eq!(sink.count_of("basemap_change_failed"), 1);
        assert_eq!(sink.count_of("map_recreated"), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_aborts_the_switch() {
        let map = map_with_basemap();
        let services = StubMapService::failing(ServiceError::Network {
            url: "https://tiles.example.com/streets/MapServer".to_string(),
            reason: "connection refused".to_string(),
        });
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        let err = switcher.switch_basemap(&tiled_target("streets")).await;
        assert!(matches!(err, Err(SwitchError::MetadataFetch { .. })));
        assert_eq!(sink.count_of("basemap_change_failed"), 1);
        assert_eq!(sink.count_of("basemap_change_complete"), 0);
    }

    #[tokio::test]
    async fn test_same_reference_snaps_to_full_extent_when_contained() {
        let map = map_with_basemap();
        // Current view [-50,50]^2 sits inside the target's full extent
        // [-100,100]^2.
        let services = StubMapService::always(metadata(WGS84));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("streets"))
            .await
            .unwrap();

        let extent = map.extent().unwrap();
        assert_eq!(
            (extent.xmin, extent.ymin, extent.xmax, extent.ymax),
            (-100.0, -100.0, 100.0, 100.0)
        );
        assert_eq!(sink.count_of("map_recreated"), 1);
        assert_eq!(sink.count_of("basemap_change_complete"), 1);
    }

    #[tokio::test]
    async fn test_same_reference_keeps_current_extent_when_not_contained() {
        let map = map_with_basemap();
        map.set_extent(Extent::new(-500.0, -50.0, 50.0, 50.0, WGS84));
        let services = StubMapService::always(metadata(WGS84));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("streets"))
            .await
            .unwrap();

        let extent = map.extent().unwrap();
        assert_eq!(extent.xmin, -500.0);
    }

    #[tokio::test]
    async fn test_cross_reference_preserves_operational_order() {
        let map = map_with_basemap();
        map.layers().add(Arc::new(Layer::feature(
            "roads",
            "https://maps.example.com/Roads/FeatureServer",
        )));
        map.layers().add(Arc::new(Layer::feature(
            "parcels",
            "https://maps.example.com/Parcels/FeatureServer",
        )));
        map.select_layer(Some("roads".to_string()));

        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("imagery"))
            .await
            .unwrap();

        assert_eq!(layer_order(&map), vec!["imagery", "roads", "parcels"]);
        assert_eq!(map.spatial_reference(), Some(WEB_MERCATOR));
        // Reprojected current extent sits inside the full extent, so the
        // view snaps to it.
        assert_eq!(map.extent().unwrap().xmin, -100.0);
        assert_eq!(map.selected_layer_id().as_deref(), Some("roads"));
        assert_eq!(
            sink.types(),
            vec!["map_recreated", "basemap_change_complete"]
        );
    }

    #[tokio::test]
    async fn test_cross_reference_declined_leaves_map_untouched() {
        let map = map_with_basemap();
        map.layers().add(Arc::new(Layer::tiled(
            "cached-overlay",
            "https://tiles.example.com/overlay/MapServer",
        )));
        let before = layer_order(&map);

        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(Decline),
            &sink,
        );

        let err = switcher.switch_basemap(&tiled_target("imagery")).await;
        assert!(matches!(err, Err(SwitchError::Declined)));

        assert_eq!(layer_order(&map), before);
        assert_eq!(map.spatial_reference(), Some(WGS84));
        assert_eq!(sink.count_of("basemap_change_failed"), 1);
    }

    #[tokio::test]
    async fn test_cross_reference_drops_confirmed_cached_layers() {
        let map = map_with_basemap();
        map.layers().add(Arc::new(Layer::tiled(
            "cached-overlay",
            "https://tiles.example.com/overlay/MapServer",
        )));
        map.layers().add(Arc::new(Layer::feature(
            "roads",
            "https://maps.example.com/Roads/FeatureServer",
        )));

        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("imagery"))
            .await
            .unwrap();

        assert_eq!(layer_order(&map), vec!["imagery", "roads"]);
    }

    #[tokio::test]
    async fn test_cross_reference_reprojects_in_memory_layers() {
        let map = map_with_basemap();
        let sketch = Arc::new(Layer::graphics(
            "sketch",
            vec![Feature::new(GeometryKind::Point, WGS84)],
        ));
        sketch.set_spatial_reference(WGS84);
        let heat = Arc::new(Layer::cluster(
            "heat",
            vec![Feature::new(GeometryKind::Point, WGS84)],
        ));
        heat.set_spatial_reference(WGS84);
        let roads = Arc::new(Layer::feature(
            "roads",
            "https://maps.example.com/Roads/FeatureServer",
        ));
        roads.set_spatial_reference(WGS84);
        map.layers().add(sketch.clone());
        map.layers().add(heat.clone());
        map.layers().add(roads.clone());

        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let geometry = RetagGeometry::new();
        let sink = CollectingSink::new();
        let switcher = switcher(&map, &services, &geometry, Arc::new(AlwaysConfirm), &sink);

        switcher
            .switch_basemap(&tiled_target("imagery"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(sketch.spatial_reference(), Some(WEB_MERCATOR));
        assert_eq!(heat.spatial_reference(), Some(WEB_MERCATOR));
        assert!(sketch
            .features()
            .iter()
            .all(|feature| feature.spatial_reference == WEB_MERCATOR));
        // One projection per in-memory layer; the feature service layer
        // reprojects server-side.
        assert_eq!(geometry.project_calls.load(Ordering::SeqCst), 2);
        assert_eq!(roads.spatial_reference(), Some(WGS84));
    }

    #[tokio::test]
    async fn test_observers_never_see_the_intermediate_swap() {
        let map = map_with_basemap();
        map.layers().add(Arc::new(Layer::feature(
            "roads",
            "https://maps.example.com/Roads/FeatureServer",
        )));
        let observer = Arc::new(CountingObserver {
            changes: AtomicUsize::new(0),
        });
        map.layers().subscribe(observer.clone());

        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("imagery"))
            .await
            .unwrap();

        assert_eq!(observer.changes.load(Ordering::SeqCst), 0);
        assert_eq!(layer_order(&map), vec!["imagery", "roads"]);
        assert!(!map.layers().notifications_suppressed());
    }

    #[tokio::test]
    async fn test_bing_style_switch_fast_path() {
        let map = Arc::new(Map::new());
        map.set_spatial_reference(WEB_MERCATOR).unwrap();
        let aerial = BaseMapInfo::new(
            "bing-aerial",
            BaseMapKind::Bing,
            "https://bing.example.com/aerial",
        );
        let existing = Arc::new(Layer::basemap(&aerial, WEB_MERCATOR));
        map.layers().insert_first(existing.clone());

        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        let roadmap = BaseMapInfo::new(
            "bing-road",
            BaseMapKind::Bing,
            "https://bing.example.com/road",
        );
        switcher.switch_basemap(&roadmap).await.unwrap();

        // No metadata fetch, no rebuild: the existing layer swaps its
        // descriptor in place.
        assert_eq!(services.calls(), 0);
        let current = map.layers().snapshot();
        assert!(Arc::ptr_eq(&current[0], &existing));
        assert_eq!(existing.basemap_info().unwrap().name, "bing-road");
        assert_eq!(sink.count_of("basemap_change_complete"), 1);
        assert_eq!(sink.count_of("map_recreated"), 0);
    }

    #[tokio::test]
    async fn test_bing_target_over_tiled_basemap_takes_the_full_path() {
        let map = map_with_basemap();
        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        let bing = BaseMapInfo::new(
            "bing-road",
            BaseMapKind::Bing,
            "https://bing.example.com/road",
        );
        switcher.switch_basemap(&bing).await.unwrap();

        assert!(services.calls() >= 1);
        assert_eq!(sink.count_of("map_recreated"), 1);
    }

    #[tokio::test]
    async fn test_map_units_resolved_by_silent_retry() {
        let map = map_with_basemap();
        let mut without_units = metadata(WGS84);
        without_units.units = None;
        let mut with_units = metadata(WGS84);
        with_units.units = Some(MapUnits::DecimalDegrees);

        // Switch fetch and first probe lack units; the second probe has
        // them.
        let services = StubMapService::sequence(
            vec![
                Ok(without_units.clone()),
                Ok(without_units.clone()),
                Ok(with_units.clone()),
            ],
            with_units,
        );
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("streets"))
            .await
            .unwrap();
        // Probes run in the background after the switch completes.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(map.map_units(), Some(MapUnits::DecimalDegrees));
        assert_eq!(services.calls(), 3);
    }

    #[tokio::test]
    async fn test_map_units_abandoned_after_retry_budget() {
        let map = map_with_basemap();
        let mut without_units = metadata(WGS84);
        without_units.units = None;
        let services = StubMapService::always(without_units);
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("streets"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(map.map_units().is_none());
        // One switch fetch plus the configured number of probes.
        assert_eq!(services.calls(), 4);
        // Giving up is silent: the switch still completed normally.
        assert_eq!(sink.count_of("basemap_change_complete"), 1);
    }

    #[tokio::test]
    async fn test_units_probes_do_not_delay_completion() {
        // First fetch answers without units; every probe after it hangs.
        struct StallingAfterFirst {
            first: ServiceMetadata,
            calls: AtomicUsize,
        }

        impl MapService for StallingAfterFirst {
            fn fetch_metadata(
                &self,
                _url: &str,
            ) -> BoxFuture<'_, Result<ServiceMetadata, ServiceError>> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let result = Ok(self.first.clone());
                    Box::pin(async move { result })
                } else {
                    Box::pin(std::future::pending())
                }
            }
        }

        let mut without_units = metadata(WGS84);
        without_units.units = None;
        let map = map_with_basemap();
        let sink = CollectingSink::new();
        let switcher = BasemapSwitcher::new(
            &ViewConfig::default(),
            Arc::clone(&map),
            Arc::new(StallingAfterFirst {
                first: without_units,
                calls: AtomicUsize::new(0),
            }),
            RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            sink.clone(),
        );

        tokio::time::timeout(
            Duration::from_millis(200),
            switcher.switch_basemap(&tiled_target("streets")),
        )
        .await
        .expect("switch must complete while units probes are pending")
        .unwrap();

        assert_eq!(sink.count_of("map_recreated"), 1);
        assert_eq!(sink.count_of("basemap_change_complete"), 1);
        assert!(map.map_units().is_none());
    }

    #[tokio::test]
    async fn test_selection_falls_back_to_new_basemap() {
        let map = map_with_basemap();
        map.select_layer(Some("old-base".to_string()));

        let services = StubMapService::always(metadata(WGS84));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        switcher
            .switch_basemap(&tiled_target("streets"))
            .await
            .unwrap();

        assert_eq!(map.selected_layer_id().as_deref(), Some("streets"));
    }

    #[tokio::test]
    async fn test_behaviors_reattach_after_switch() {
        struct CountingBehavior {
            attaches: AtomicUsize,
        }

        impl MapBehavior for CountingBehavior {
            fn name(&self) -> &str {
                "tooltips"
            }

            fn attach(&self, _map: &Arc<Map>) {
                self.attaches.fetch_add(1, Ordering::SeqCst);
            }
        }

        let map = map_with_basemap();
        let services = StubMapService::always(metadata(WGS84));
        let sink = CollectingSink::new();
        let switcher = switcher(
            &map,
            &services,
            &RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            &sink,
        );

        let behavior = Arc::new(CountingBehavior {
            attaches: AtomicUsize::new(0),
        });
        switcher.register_behavior(behavior.clone());
        assert_eq!(behavior.attaches.load(Ordering::SeqCst), 1);

        switcher
            .switch_basemap(&tiled_target("streets"))
            .await
            .unwrap();
        assert_eq!(behavior.attaches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_basemap_adopts_service_reference() {
        let map = Arc::new(Map::new());
        let services = StubMapService::always(metadata(WEB_MERCATOR));
        let switcher = BasemapSwitcher::new(
            &ViewConfig::default(),
            Arc::clone(&map),
            services.clone(),
            RetagGeometry::new(),
            Arc::new(AlwaysConfirm),
            Arc::new(NullEventSink),
        );

        switcher
            .switch_basemap(&tiled_target("imagery"))
            .await
            .unwrap();

        assert_eq!(map.spatial_reference(), Some(WEB_MERCATOR));
        // No previous view, so the service's initial extent wins.
        assert_eq!(map.extent().unwrap().xmin, -10.0);
        assert_eq!(layer_order(&map), vec!["imagery"]);
    }
}
