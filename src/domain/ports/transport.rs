//! Transport Port
//!
//! Defines the datagram interface the sync engine talks to.
//! Implementations may use UDP multicast or an in-process bus.

use async_trait::async_trait;
use bytes::Bytes;

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Raw payload, at most one encoded message
    pub payload: Bytes,
    /// Whether this node transmitted the datagram itself
    pub from_self: bool,
}

impl Datagram {
    pub fn new(payload: impl Into<Bytes>, from_self: bool) -> Self {
        Self {
            payload: payload.into(),
            from_self,
        }
    }
}

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),
    #[error("failed to join multicast group on {interface}: {source}")]
    Join {
        interface: String,
        #[source]
        source: std::io::Error,
    },
    #[error("socket setup failed: {0}")]
    Setup(#[source] std::io::Error),
    #[error("transport closed")]
    Closed,
}

/// Best-effort datagram transport shared by every node of a group.
///
/// This is an outbound port: the engine sends whole encoded messages and
/// receives whatever the group delivers, without acknowledgements.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmit one datagram to the whole group.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next datagram from the group.
    async fn recv(&self) -> Result<Datagram, TransportError>;
}
