//! Top-level glue binding the other four subsystems (spec §4.5).
//!
//! Owns the tracker connection, maintains a registry of swarms, and maps
//! [`meshcast_transport`] events to [`meshcast_swarm`] calls. No other
//! subsystem stores a back-pointer into this one — each emits events or
//! pure action intents that this crate alone dispatches (spec §9's
//! cyclic-reference redesign note).

mod address_book;
mod config;
mod coordinator;
mod error;
mod peer;
mod scene;
mod tracker_client;

pub use config::EngineConfig;
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::CoordinatorError;
pub use scene::{CoordinatorEvent, NullSceneSink, SceneSink};

pub use meshcast_chunker::{ContentId, Package, Provenance, Transform};
pub use meshcast_transport::{Multiaddr, PeerId};
