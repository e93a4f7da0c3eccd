//! The map: spatial reference, extent, and layer collection.

mod collection;

pub use collection::{CollectionChange, CollectionObserver, LayerCollection};

use crate::geo::{Extent, SpatialReference};
use crate::service::MapUnits;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors from map mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// The spatial reference cannot change while layers are present;
    /// cached layers are tied to the coordinate system they were
    /// rendered in.
    #[error("spatial reference is frozen at wkid {current} while layers are present (requested wkid {requested})")]
    SpatialReferenceFrozen { current: i32, requested: i32 },
}

#[derive(Debug)]
struct MapInner {
    spatial_reference: Option<SpatialReference>,
    extent: Option<Extent>,
    map_units: Option<MapUnits>,
    selected_layer: Option<String>,
}

/// A map instance.
///
/// The map itself is a stable identity: the basemap switcher rebuilds
/// the layer collection in place rather than allocating a new map, so
/// an `Arc<Map>` handed out once stays valid across switches.
#[derive(Debug)]
pub struct Map {
    inner: Mutex<MapInner>,
    layers: LayerCollection,
}

impl Map {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MapInner {
                spatial_reference: None,
                extent: None,
                map_units: None,
                selected_layer: None,
            }),
            layers: LayerCollection::new(),
        }
    }

    /// The layer collection.
    pub fn layers(&self) -> &LayerCollection {
        &self.layers
    }

    /// Coordinate system of the map, adopted from the first basemap.
    pub fn spatial_reference(&self) -> Option<SpatialReference> {
        self.inner.lock().unwrap().spatial_reference
    }

    /// Set or change the map's coordinate system.
    ///
    /// The spatial reference can be set freely while it is unset or
    /// while the layer collection is empty. Once layers are present a
    /// different value is rejected; re-asserting an equivalent one is a
    /// no-op.
    pub fn set_spatial_reference(
        &self,
        spatial_reference: SpatialReference,
    ) -> Result<(), MapError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.spatial_reference {
            Some(current) if current.equivalent_to(&spatial_reference) => Ok(()),
            Some(current) => {
                if self.layers.is_empty() {
                    inner.spatial_reference = Some(spatial_reference);
                    Ok(())
                } else {
                    Err(MapError::SpatialReferenceFrozen {
                        current: current.wkid(),
                        requested: spatial_reference.wkid(),
                    })
                }
            }
            None => {
                inner.spatial_reference = Some(spatial_reference);
                Ok(())
            }
        }
    }

    /// Current visible extent.
    pub fn extent(&self) -> Option<Extent> {
        self.inner.lock().unwrap().extent
    }

    pub fn set_extent(&self, extent: Extent) {
        self.inner.lock().unwrap().extent = Some(extent);
    }

    /// Linear units of the map, once probed.
    pub fn map_units(&self) -> Option<MapUnits> {
        self.inner.lock().unwrap().map_units
    }

    pub fn set_map_units(&self, units: MapUnits) {
        self.inner.lock().unwrap().map_units = Some(units);
    }

    /// Id of the currently selected layer, if any.
    pub fn selected_layer_id(&self) -> Option<String> {
        self.inner.lock().unwrap().selected_layer.clone()
    }

    /// Select a layer (or clear the selection with `None`).
    pub fn select_layer(&self, id: Option<String>) {
        self.inner.lock().unwrap().selected_layer = id;
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

/// A pluggable behavior attached to a map.
///
/// Behaviors hold subscriptions into a particular map's collections, so
/// after a basemap switch rebuilds the layer collection each behavior
/// is re-attached to pick the new contents up.
pub trait MapBehavior: Send + Sync {
    /// Stable name, for logging.
    fn name(&self) -> &str;

    /// Attach (or re-attach) to the map.
    fn attach(&self, map: &Arc<Map>);
}
