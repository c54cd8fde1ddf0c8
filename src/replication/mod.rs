//! Drawing Log Replication
//!
//! Keeps a versioned log of drawing events consistent across every node of a
//! multicast group, without a coordinator.
//!
//! ## How It Works
//!
//! 1. A joining node multicasts `GetAll`; peers answer with their whole log
//! 2. Originated events are stamped with `highest + 1` and multicast
//! 3. Every received event is saved and applied to the view once; duplicates
//!    are dropped on save
//! 4. Holes in the version sequence are tracked and requested once per
//!    reconcile interval with `GetVersions`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use board_sync::adapters::outbound::{LoggingBoard, MulticastConfig, MulticastTransport};
//! use board_sync::replication::{SyncConfig, SyncEngine};
//!
//! let transport = Arc::new(MulticastTransport::bind(&MulticastConfig::default())?);
//! let engine = Arc::new(SyncEngine::new(
//!     SyncConfig::new("node-1"),
//!     transport,
//!     Arc::new(LoggingBoard::default()),
//! )?);
//! engine.start();
//! ```

mod codec;
mod config;
mod engine;
mod queue;
mod store;
mod types;

pub use codec::{Codec, CodecError, WireFormat, MAX_DATAGRAM_SIZE};
pub use config::{ConfigError, EchoMode, SyncConfig};
pub use engine::{NodePhase, SyncEngine};
pub use queue::SendQueue;
pub use store::VersionedStore;
pub use types::{Event, EventKind, Message, Point, MAX_DECODE_DEPTH};
