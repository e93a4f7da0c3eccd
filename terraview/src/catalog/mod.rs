//! Basemap catalog: descriptors and their XML round-trip.

mod types;
mod xml;

pub use types::{BaseMapInfo, BaseMapKind};
pub use xml::{load_catalog, parse_catalog, save_catalog, write_catalog, CatalogError};
