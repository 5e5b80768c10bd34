use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::{debug, warn};

/// Relay errors fatal to a single connection
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("write deadline expired")]
    WriteTimeout,

    #[error("hub is not running")]
    HubClosed,
}

const CONN_ID_LEN: usize = 21;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Connection ID: 21-byte fixed array ("conn_" + 16 hex), assigned
/// server-side at registration and never chosen by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    bytes: [u8; CONN_ID_LEN],
    len: u8,
}

impl ConnId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONN_ID_LEN];
        bytes[..5].copy_from_slice(b"conn_");

        let mut rng = rand::rng();
        let value: u64 = rng.random();

        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            bytes[5 + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CONN_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        let mut bytes = [0u8; CONN_ID_LEN];
        let src = s.as_bytes();
        let len = src.len().min(CONN_ID_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

impl Serialize for ConnId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Owned: ids also arrive nested in `data` objects and are decoded
        // with from_value, which cannot hand out borrowed strings.
        let s = String::deserialize(deserializer)?;
        // Reject rather than truncate: a truncated id could collide with a
        // registered connection and misdeliver the message.
        if s.len() > CONN_ID_LEN {
            return Err(serde::de::Error::invalid_length(
                s.len(),
                &"a connection id of at most 21 bytes",
            ));
        }
        Ok(ConnId::from(s.as_str()))
    }
}

/// Room ID: caller-supplied name of a negotiation session. Arbitrary
/// length, so a string newtype rather than a fixed array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes,
/// serialized once and cheaply cloned across fan-outs.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// A registered connection as the hub sees it.
#[derive(Debug)]
pub(crate) struct PeerHandle {
    pub id: ConnId,
    /// Room this connection has joined, set at most once.
    pub room: Option<RoomId>,
    /// Bounded mailbox drained by the connection's write pump.
    pub tx: mpsc::Sender<OutboundMessage>,
}

impl PeerHandle {
    /// Queue a message without ever blocking the hub. A full mailbox means
    /// the peer has stalled; the message is dropped, not waited on.
    pub fn deliver(&self, msg: OutboundMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("mailbox full for {}, dropping message", self.id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("mailbox closed for {}, dropping message", self.id);
            }
        }
    }
}
