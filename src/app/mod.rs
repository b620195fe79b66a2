//! Application core: the single-threaded orchestrator and the typed events
//! that feed it.
//!
//! All hardware interaction happens through the port traits in
//! [`crate::hal`], so the whole decision path runs unmodified against the
//! in-memory fakes.

pub mod events;
pub mod service;

pub use service::Orchestrator;
