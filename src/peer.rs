//! Client-side peer coordination: one link per remote member, negotiated
//! over the signaling relay, carrying the file framing protocol

mod client;
mod connection;
mod coordinator;
mod link;
pub mod memory;

pub use client::SignalingClient;
pub use connection::{LinkEvent, LinkEventKind, PeerConnection, PeerConnector, Role};
pub use coordinator::{Coordinator, CoordinatorEvent};
pub use link::PeerLink;

use thiserror::Error;

use crate::signaling::RoomId;
use crate::transfer::TransferError;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("negotiation failed: {0}")]
    NegotiationFailure(String),

    #[error("data channel error: {0}")]
    ChannelError(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("event receiver dropped")]
    EventsClosed,
}
