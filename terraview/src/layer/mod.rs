//! Layers and their initialization lifecycle.

mod lifecycle;
mod types;

pub use lifecycle::LayerLifecycleManager;
pub use types::{Layer, LayerInitData, LayerKind, LayerState};
