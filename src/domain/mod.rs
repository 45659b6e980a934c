//! Domain layer for play-analytics.
//!
//! Contains the canonical types shared across all modules:
//! - `Event` / `PartialEvent`: the pipeline's core record before and after enrichment
//! - `SessionContext`: the (game id, play id) pair attached to every event
//! - `EnvironmentSnapshot`: opaque device/runtime descriptors
//! - `NetworkStatus`: host-reported connectivity

pub mod environment;
pub mod event;
pub mod network;

pub use environment::EnvironmentSnapshot;
pub use event::{
    Coordinates, DEFAULT_EVENT_TYPE, ElementMetadata, ErrorDetail, Event, EventId, PartialEvent,
    SessionContext,
};
pub use network::NetworkStatus;
