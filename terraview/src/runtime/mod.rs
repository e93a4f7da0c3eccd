//! Session runtime: readiness tracking, event fanout, and wiring.
//!
//! The components in this module glue the rest of the crate together.
//! [`ViewSession`] owns one of everything; [`InitializationTracker`]
//! decides when the session counts as ready; the [`EventSink`] family
//! decouples emitters from observers the same way a channel would:
//!
//! - Emitters only know: "I can hand a [`ViewEvent`] to this sink"
//! - Observers only know: "I receive [`ViewEvent`]s from a receiver"
//!
//! Components never call each other back directly; anything a host (or
//! another component) needs to react to is an event.

mod events;
mod session;
mod tracker;

pub use events::{
    BroadcastEventSink, EventSink, FanoutEventSink, NullEventSink, TracingEventSink, ViewEvent,
};
pub use session::{SessionServices, ViewSession};
pub use tracker::InitializationTracker;
