//! Steward Coordinator - the execution/interaction bridge
//!
//! The interaction side (a console, a UI event loop) must never block on
//! execution work. The [`Coordinator`] launches each run on its own named
//! OS thread with a private single-threaded tokio runtime and hands back a
//! run id straight away.
//!
//! Everything crossing back is a notification on the shared hub; everything
//! crossing forward is one of three short, synchronous calls:
//!
//! - [`Coordinator::start`]
//! - [`Coordinator::resolve_approval`]
//! - [`Coordinator::cancel`]
//!
//! At most one run is active at a time. A run counts as active from `start`
//! until just before its `RunFinished` notification is published.

#![deny(unsafe_code)]

mod config;
mod coordinator;
mod error;

pub use config::*;
pub use coordinator::*;
pub use error::*;
