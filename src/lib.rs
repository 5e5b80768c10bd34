//! WebSocket signaling relay for WebRTC peer negotiation.
//!
//! Peers join named rooms and exchange opaque offer/answer/candidate
//! payloads; the relay forwards them by peer id and never inspects them.

mod conn;
mod hub;
mod messages;
mod router;
mod server;
mod types;

pub use hub::HubHandle;
pub use messages::{ClientEvent, Envelope, ServerEvent};
pub use server::{DEFAULT_RELAY_PORT, RelayServer};
pub use types::{ConnId, OutboundMessage, RelayError, RoomId};
