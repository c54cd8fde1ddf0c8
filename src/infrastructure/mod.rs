//! Infrastructure Layer
//!
//! Cross-cutting concerns shared by the node's loops.

pub mod shutdown;

pub use shutdown::{shutdown_signal, ShutdownController};
