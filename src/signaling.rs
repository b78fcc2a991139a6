//! WebSocket signaling relay: rooms, membership, and negotiation payload relay

mod actor;
mod messages;
mod registry;
mod server;
mod types;

pub use actor::{Joined, RoomManagerHandle};
pub use messages::{ClientMessage, ServerMessage};
pub use server::{DEFAULT_SIGNALING_PORT, Keepalive, SignalingServer};
pub use types::{MemberId, OutboundMessage, ROOM_ID_LEN, RoomId, SignalingError};
