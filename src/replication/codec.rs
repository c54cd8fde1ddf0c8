//! Wire Codec
//!
//! Encodes a [`Message`] into exactly one datagram and back. Both formats keep
//! the variant discriminator on the wire, so a decoder rebuilds the right
//! variant without any out-of-band schema.

use crate::replication::types::Message;
use serde::{Deserialize, Serialize};

/// Largest datagram a node will send or accept.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Datagram encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireFormat {
    /// Self-describing JSON, variants as `{"Name": {...}}`
    #[default]
    Json,
    /// Compact bincode, variants as a leading index
    Binary,
}

impl WireFormat {
    /// Parse a format name (`json` or `binary`), case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(WireFormat::Json),
            "binary" | "bincode" => Some(WireFormat::Binary),
            _ => None,
        }
    }
}

/// Errors produced while encoding or decoding a datagram.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed json datagram: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed binary datagram: {0}")]
    Binary(#[from] bincode::Error),
    #[error("encoded message is {len} bytes, limit is {max}")]
    Oversized { len: usize, max: usize },
    #[error("empty datagram")]
    Empty,
}

/// Message codec bound to one wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    format: WireFormat,
}

impl Codec {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Encode a message into a single datagram payload.
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, CodecError> {
        let data = match self.format {
            WireFormat::Json => serde_json::to_vec(msg)?,
            WireFormat::Binary => bincode::serialize(msg)?,
        };

        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(CodecError::Oversized {
                len: data.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        Ok(data)
    }

    /// Decode one datagram payload.
    pub fn decode(&self, data: &[u8]) -> Result<Message, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Empty);
        }

        let msg = match self.format {
            WireFormat::Json => serde_json::from_slice(data)?,
            WireFormat::Binary => bincode::deserialize(data)?,
        };
        Ok(msg)
    }
}
