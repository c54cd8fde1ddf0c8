//! Adapters Layer
//!
//! Inbound adapters feed drawing commands into the engine; outbound adapters
//! implement the transport and event sink ports.

pub mod inbound;
pub mod outbound;
