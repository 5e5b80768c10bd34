use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ConnId, OutboundMessage, RoomId};

/// Raw inbound wire envelope. Only the shape is validated here; the `data`
/// payload is decoded per event name at dispatch time.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(default)]
    pub data: Value,
}

/// Decoded signaling requests from a peer
#[derive(Debug)]
pub enum ClientEvent {
    /// Join a named room (created lazily on first use)
    Join { room: RoomId },

    /// Forward a connectivity candidate to another peer
    IceCandidate { candidate: Value, target: ConnId },

    /// Forward a session offer to another peer
    Offer { sdp: Value, target: ConnId },

    /// Forward a session answer to another peer
    Answer { sdp: Value, target: ConnId },
}

#[derive(Deserialize)]
struct JoinData {
    room: RoomId,
}

#[derive(Deserialize)]
struct CandidateData {
    candidate: Value,
    #[serde(rename = "socketId")]
    socket_id: ConnId,
}

#[derive(Deserialize)]
struct SdpData {
    sdp: Value,
    #[serde(rename = "socketId")]
    socket_id: ConnId,
}

impl ClientEvent {
    /// Decode an envelope's payload against the schema its event name
    /// demands. `Ok(None)` means the event name is not part of the
    /// vocabulary and the envelope should be ignored.
    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>, serde_json::Error> {
        let event = match envelope.event_name.as_str() {
            "join" => {
                let data: JoinData = serde_json::from_value(envelope.data)?;
                Self::Join { room: data.room }
            }
            "ice-candidate" => {
                let data: CandidateData = serde_json::from_value(envelope.data)?;
                Self::IceCandidate {
                    candidate: data.candidate,
                    target: data.socket_id,
                }
            }
            "offer" => {
                let data: SdpData = serde_json::from_value(envelope.data)?;
                Self::Offer {
                    sdp: data.sdp,
                    target: data.socket_id,
                }
            }
            "answer" => {
                let data: SdpData = serde_json::from_value(envelope.data)?;
                Self::Answer {
                    sdp: data.sdp,
                    target: data.socket_id,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Messages sent from relay to peer. Serializes to the wire shape
/// `{"eventName": ..., "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventName", content = "data")]
pub enum ServerEvent {
    /// A new peer joined the sender's room
    #[serde(rename = "peer-joined")]
    PeerJoined {
        #[serde(rename = "socketId")]
        socket_id: ConnId,
    },

    /// A peer disconnected
    #[serde(rename = "peer-left")]
    PeerLeft {
        #[serde(rename = "socketId")]
        socket_id: ConnId,
    },

    /// Join reply: the room's existing members plus the joiner's own id
    #[serde(rename = "peers-list")]
    PeersList {
        connections: Vec<ConnId>,
        you: ConnId,
    },

    /// Forwarded candidate; `socket_id` is the originating peer
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        candidate: Value,
        #[serde(rename = "socketId")]
        socket_id: ConnId,
    },

    /// Forwarded offer; `socket_id` is the originating peer
    #[serde(rename = "offer")]
    Offer {
        sdp: Value,
        #[serde(rename = "socketId")]
        socket_id: ConnId,
    },

    /// Forwarded answer; `socket_id` is the originating peer
    #[serde(rename = "answer")]
    Answer {
        sdp: Value,
        #[serde(rename = "socketId")]
        socket_id: ConnId,
    },
}

impl ServerEvent {
    /// Serialize to the frame written on the wire.
    pub fn encode(&self) -> OutboundMessage {
        let json = serde_json::to_string(self).expect("ServerEvent serialization should never fail");
        OutboundMessage::from(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_name: &str, data: Value) -> Envelope {
        Envelope {
            event_name: event_name.to_string(),
            data,
        }
    }

    #[test]
    fn parse_join() {
        let json = r#"{"eventName": "join", "data": {"room": "lobby"}}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        let event = ClientEvent::from_envelope(env).unwrap().unwrap();
        if let ClientEvent::Join { room } = event {
            assert_eq!(room.as_str(), "lobby");
        } else {
            panic!("Expected Join");
        }
    }

    #[test]
    fn parse_ice_candidate() {
        let env = envelope(
            "ice-candidate",
            json!({"candidate": {"sdpMid": "0"}, "socketId": "conn_0123456789abcdef"}),
        );
        let event = ClientEvent::from_envelope(env).unwrap().unwrap();
        if let ClientEvent::IceCandidate { candidate, target } = event {
            assert_eq!(candidate, json!({"sdpMid": "0"}));
            assert_eq!(target.as_str(), "conn_0123456789abcdef");
        } else {
            panic!("Expected IceCandidate");
        }
    }

    #[test]
    fn parse_offer_and_answer() {
        for name in ["offer", "answer"] {
            let env = envelope(name, json!({"sdp": "v=0", "socketId": "conn_0123456789abcdef"}));
            let event = ClientEvent::from_envelope(env).unwrap().unwrap();
            match event {
                ClientEvent::Offer { sdp, .. } | ClientEvent::Answer { sdp, .. } => {
                    assert_eq!(sdp, json!("v=0"));
                }
                other => panic!("Expected Offer/Answer, got {:?}", other),
            }
        }
    }

    #[test]
    fn unknown_event_name_is_not_an_error() {
        let env = envelope("subscribe", json!({"topic": "news"}));
        assert!(ClientEvent::from_envelope(env).unwrap().is_none());
    }

    #[test]
    fn join_without_room_fails() {
        let env = envelope("join", json!({}));
        assert!(ClientEvent::from_envelope(env).is_err());
    }

    #[test]
    fn overlong_socket_id_fails_decode() {
        let env = envelope(
            "offer",
            json!({"sdp": "v=0", "socketId": "conn_0123456789abcdef0"}),
        );
        assert!(ClientEvent::from_envelope(env).is_err());
    }

    #[test]
    fn missing_data_fails_for_known_events() {
        let json = r#"{"eventName": "offer"}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert!(ClientEvent::from_envelope(env).is_err());
    }

    #[test]
    fn envelope_without_event_name_is_malformed() {
        let result: Result<Envelope, _> = serde_json::from_str(r#"{"data": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn serialize_peer_joined() {
        let msg = ServerEvent::PeerJoined {
            socket_id: ConnId::from("conn_0123456789abcdef"),
        };
        let wire: Value = serde_json::from_str(msg.encode().as_str()).unwrap();
        assert_eq!(wire["eventName"], "peer-joined");
        assert_eq!(wire["data"]["socketId"], "conn_0123456789abcdef");
    }

    #[test]
    fn serialize_peers_list() {
        let msg = ServerEvent::PeersList {
            connections: vec![ConnId::from("conn_aaaaaaaaaaaaaaaa")],
            you: ConnId::from("conn_bbbbbbbbbbbbbbbb"),
        };
        let wire: Value = serde_json::from_str(msg.encode().as_str()).unwrap();
        assert_eq!(wire["eventName"], "peers-list");
        assert_eq!(wire["data"]["connections"], json!(["conn_aaaaaaaaaaaaaaaa"]));
        assert_eq!(wire["data"]["you"], "conn_bbbbbbbbbbbbbbbb");
    }

    #[test]
    fn serialize_forwarded_candidate_keeps_payload() {
        let candidate = json!({"candidate": "candidate:1 1 UDP 2130706431 192.0.2.1 54321 typ host"});
        let msg = ServerEvent::IceCandidate {
            candidate: candidate.clone(),
            socket_id: ConnId::from("conn_0123456789abcdef"),
        };
        let wire: Value = serde_json::from_str(msg.encode().as_str()).unwrap();
        assert_eq!(wire["eventName"], "ice-candidate");
        assert_eq!(wire["data"]["candidate"], candidate);
    }
}
