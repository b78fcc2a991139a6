use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{MemberId, OutboundMessage, RoomId, SignalingError};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Create a room (if unseen) and join it
    Create { room_id: RoomId },

    /// Join an existing room, optionally under a chosen member id
    Join {
        room_id: RoomId,
        #[serde(default, alias = "clientId", skip_serializing_if = "Option::is_none")]
        member_id: Option<MemberId>,
    },

    /// Negotiation payload for `peer_id`, relayed verbatim
    Signal { peer_id: MemberId, signal: Value },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Create/join acknowledgement with the members present before us
    Joined {
        room_id: RoomId,
        member_id: MemberId,
        peers: Vec<MemberId>,
    },

    PeerJoined { peer_id: MemberId },

    PeerLeft { peer_id: MemberId },

    RoomNonexistent { room_id: RoomId },

    /// Relayed negotiation payload; `peer_id` is the sender
    Signal { peer_id: MemberId, signal: Value },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(|e| SignalingError::MalformedMessage(e.to_string()))
    }
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(|e| SignalingError::MalformedMessage(e.to_string()))
    }

    pub fn to_outbound(&self) -> Result<OutboundMessage, SignalingError> {
        serde_json::to_string(self)
            .map(OutboundMessage::from)
            .map_err(|e| SignalingError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_create() {
        let json = r#"{"type": "create", "roomId": "abc12345"}"#;
        let msg = ClientMessage::parse(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Create {
                room_id: RoomId::from("abc12345")
            }
        );
    }

    #[test]
    fn parse_join_without_member_id() {
        let json = r#"{"type": "join", "roomId": "abc12345"}"#;
        if let ClientMessage::Join { room_id, member_id } = ClientMessage::parse(json).unwrap() {
            assert_eq!(room_id.as_str(), "abc12345");
            assert!(member_id.is_none());
        } else {
            panic!("Expected Join");
        }
    }

    #[test]
    fn parse_join_accepts_client_id_alias() {
        let json = r#"{"type": "join", "roomId": "abc12345", "clientId": "me"}"#;
        if let ClientMessage::Join { member_id, .. } = ClientMessage::parse(json).unwrap() {
            assert_eq!(member_id, Some(MemberId::from("me")));
        } else {
            panic!("Expected Join");
        }
    }

    #[test]
    fn parse_signal_keeps_payload_opaque() {
        let json = r#"{"type": "signal", "peerId": "peer_1", "signal": {"sdp": "v=0", "n": [1, 2]}}"#;
        if let ClientMessage::Signal { peer_id, signal } = ClientMessage::parse(json).unwrap() {
            assert_eq!(peer_id.as_str(), "peer_1");
            assert_eq!(signal, json!({"sdp": "v=0", "n": [1, 2]}));
        } else {
            panic!("Expected Signal");
        }
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = ClientMessage::parse(r#"{"type": "leave"}"#).unwrap_err();
        assert!(matches!(err, SignalingError::MalformedMessage(_)));
    }

    #[test]
    fn missing_room_id_is_malformed() {
        assert!(ClientMessage::parse(r#"{"type": "create"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type": "join", "roomId": ""}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn serialize_joined() {
        let msg = ServerMessage::Joined {
            room_id: RoomId::from("test1234"),
            member_id: MemberId::from("peer_new12345"),
            peers: vec![MemberId::from("peer_existing")],
        };
        let value: Value = serde_json::from_str(msg.to_outbound().unwrap().as_str()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "joined",
                "roomId": "test1234",
                "memberId": "peer_new12345",
                "peers": ["peer_existing"],
            })
        );
    }

    #[test]
    fn serialize_peer_notifications() {
        let joined = serde_json::to_value(ServerMessage::PeerJoined {
            peer_id: MemberId::from("peer_a"),
        })
        .unwrap();
        assert_eq!(joined, json!({"type": "peer-joined", "peerId": "peer_a"}));

        let left = serde_json::to_value(ServerMessage::PeerLeft {
            peer_id: MemberId::from("peer_a"),
        })
        .unwrap();
        assert_eq!(left, json!({"type": "peer-left", "peerId": "peer_a"}));
    }

    #[test]
    fn serialize_room_nonexistent() {
        let value = serde_json::to_value(ServerMessage::RoomNonexistent {
            room_id: RoomId::from("gone1234"),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "room-nonexistent", "roomId": "gone1234"}));
    }

    #[test]
    fn server_signal_parses_back() {
        let msg = ServerMessage::Signal {
            peer_id: MemberId::from("peer_b"),
            signal: json!({"type": "offer"}),
        };
        let text = msg.to_outbound().unwrap();
        assert_eq!(ServerMessage::parse(text.as_str()).unwrap(), msg);
    }
}
