//! In-Memory Transport
//!
//! Implements Transport over a tokio broadcast channel. Every endpoint of a
//! hub sees every datagram, like members of one multicast group on a
//! loss-free LAN. Used to run several engines inside one process.

use crate::domain::ports::{Datagram, Transport, TransportError};
use crate::replication::MAX_DATAGRAM_SIZE;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

#[derive(Debug, Clone)]
struct Frame {
    sender: usize,
    payload: Bytes,
}

/// Shared in-process multicast group.
#[derive(Clone)]
pub struct MemoryHub {
    tx: broadcast::Sender<Frame>,
    next_id: Arc<AtomicUsize>,
    loopback: bool,
}

impl MemoryHub {
    /// Create a hub that delivers datagrams back to their sender.
    pub fn new() -> Self {
        Self::with_loopback(true)
    }

    /// Create a hub, choosing whether senders hear their own datagrams.
    pub fn with_loopback(loopback: bool) -> Self {
        let (tx, _) = broadcast::channel(4096);
        Self {
            tx,
            next_id: Arc::new(AtomicUsize::new(0)),
            loopback,
        }
    }

    /// Attach a new member to the group.
    pub fn endpoint(&self) -> MemoryTransport {
        MemoryTransport {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            tx: self.tx.clone(),
            rx: Mutex::new(self.tx.subscribe()),
            loopback: self.loopback,
            receiving: AtomicBool::new(true),
        }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One member of a [`MemoryHub`].
pub struct MemoryTransport {
    id: usize,
    tx: broadcast::Sender<Frame>,
    rx: Mutex<broadcast::Receiver<Frame>>,
    loopback: bool,
    receiving: AtomicBool,
}

impl MemoryTransport {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Drop every inbound datagram while `false`, simulating loss.
    pub fn set_receiving(&self, receiving: bool) {
        self.receiving.store(receiving, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("datagram of {} bytes exceeds {}", payload.len(), MAX_DATAGRAM_SIZE),
            )));
        }

        // No receivers is not an error for a best-effort group.
        let _ = self.tx.send(Frame {
            sender: self.id,
            payload: Bytes::copy_from_slice(payload),
        });
        Ok(())
    }

    async fn recv(&self) -> Result<Datagram, TransportError> {
        let mut rx = self.rx.lock().await;

        loop {
            match rx.recv().await {
                Ok(frame) => {
                    let from_self = frame.sender == self.id;
                    if from_self && !self.loopback {
                        continue;
                    }
                    if !self.receiving.load(Ordering::SeqCst) {
                        tracing::trace!("memory endpoint {} dropping datagram", self.id);
                        continue;
                    }
                    return Ok(Datagram {
                        payload: frame.payload,
                        from_self,
                    });
                }
                Err(broadcast::error::RecvError::Lagged(lost)) => {
                    tracing::warn!("memory endpoint {} lagged, {} datagrams lost", self.id, lost);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }
}
