//! Basemap switching.

mod switcher;

pub use switcher::{BasemapSwitcher, SwitchError};
