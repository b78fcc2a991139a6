use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling server errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

const ROOM_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
/// Length of generated room ids, which double as shareable link tokens.
pub const ROOM_ID_LEN: usize = 8;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Opaque room identifier chosen by the creating client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(Arc<str>);

impl RoomId {
    /// Random 8-character token from `[a-z0-9]`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let token: String = (0..ROOM_ID_LEN)
            .map(|_| ROOM_ID_CHARS[rng.random_range(0..ROOM_ID_CHARS.len())] as char)
            .collect();
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id has the shape of a shareable link token.
    pub fn is_link_token(&self) -> bool {
        self.0.len() == ROOM_ID_LEN && self.0.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(serde::de::Error::custom("room id must not be empty"));
        }
        Ok(RoomId(s.into()))
    }
}

/// Opaque member identifier, supplied by the joining party or generated
/// as `"peer_"` + 8 hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(Arc<str>);

impl MemberId {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let value: u32 = rng.random();

        let mut id = String::with_capacity(13);
        id.push_str("peer_");
        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            id.push(HEX_CHARS[nibble] as char);
        }
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl Serialize for MemberId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MemberId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(MemberId(s.into()))
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// Departed members are removed outright, so every stored member is active.
#[derive(Debug)]
pub(crate) struct Member {
    pub id: MemberId,
    /// Channel for outbound messages to this member's connection.
    pub tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// Members in join order.
#[derive(Debug, Default)]
pub(crate) struct Room {
    pub members: Vec<Member>,
}

impl Room {
    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.iter().any(|m| &m.id == id)
    }

    pub fn get(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| &m.id == id)
    }

    pub fn remove(&mut self, id: &MemberId) -> Option<Member> {
        let pos = self.members.iter().position(|m| &m.id == id)?;
        Some(self.members.remove(pos))
    }

    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    /// Deliver to every member except `sender`.
    pub fn broadcast(&self, sender: Option<&MemberId>, msg: &OutboundMessage) {
        for member in &self.members {
            if Some(&member.id) != sender {
                let _ = member.tx.send(msg.clone());
            }
        }
    }
}
