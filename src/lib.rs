//! board-sync Library
//!
//! Replicates a shared drawing board between peers on a multicast group.
//! Exposes the sync engine, its ports and adapters for use in integration
//! tests and as a library.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod replication;

// Re-export commonly used types
pub use config::load_config;
pub use domain::ports::{Datagram, EventSink, Transport, TransportError};
pub use infrastructure::ShutdownController;
pub use replication::{Event, EventKind, Message, Point, SyncConfig, SyncEngine};
