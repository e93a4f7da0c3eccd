//! Trait seams for the external collaborators of the orchestration core.
//!
//! Map services, the geometry (reprojection) service, the default-style
//! provider, and the user confirmation channel are all injected through
//! traits so the core can be driven end to end in tests with mocks.
//! Futures are boxed ([`BoxFuture`]) to keep every trait usable behind
//! `Arc<dyn ...>`.

mod error;
mod traits;
mod types;

pub use error::ServiceError;
pub use traits::{
    AlwaysConfirm, BoxFuture, ConfirmationGate, GeometryService, MapService, StyleProvider,
};
pub use types::{MapUnits, Renderer, ServiceMetadata};
