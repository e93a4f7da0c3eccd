//! TerraView - async initialization orchestration for interactive maps
//!
//! This library provides the coordination layer between a map UI and the
//! remote services it depends on: layer initialization tracking, basemap
//! switching with spatial-reference reconciliation, and credential
//! challenge mediation.
//!
//! # High-Level API
//!
//! Most hosts only ever talk to a [`runtime::ViewSession`]:
//!
//! ```ignore
//! use terraview::config::ViewConfig;
//! use terraview::runtime::{SessionServices, ViewSession};
//!
//! let session = ViewSession::new(ViewConfig::default(), services);
//!
//! session.switch_basemap(&catalog_entry).await?;
//! session.add_layer(roads);
//! session.start();
//!
//! session.wait_ready().await;
//! ```
//!
//! The session emits [`runtime::ViewEvent`]s for everything a host needs
//! to react to; subscribe with [`runtime::ViewSession::subscribe`].

pub mod auth;
pub mod basemap;
pub mod catalog;
pub mod config;
pub mod geo;
pub mod layer;
pub mod logging;
pub mod map;
pub mod runtime;
pub mod service;
pub mod throttle;

/// Version of the TerraView library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
