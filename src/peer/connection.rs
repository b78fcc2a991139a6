use serde_json::Value;
use tokio::sync::mpsc;

use super::PeerError;
use crate::signaling::MemberId;
use crate::transfer::ChannelMessage;

/// Which side of a pair starts negotiating. Exactly one side initiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Something a peer connection reports back to the coordinator
#[derive(Debug)]
pub struct LinkEvent {
    pub peer_id: MemberId,
    pub kind: LinkEventKind,
}

#[derive(Debug)]
pub enum LinkEventKind {
    /// Outgoing negotiation payload, to be relayed to the peer
    Signal(Value),
    /// Data channel is open
    Open,
    Message(ChannelMessage),
    Closed,
    Failed(PeerError),
}

impl LinkEvent {
    pub fn new(peer_id: MemberId, kind: LinkEventKind) -> Self {
        Self { peer_id, kind }
    }
}

/// Creates negotiated connections. Implementations report everything that
/// happens on a connection through `events`, tagged with `peer_id`.
pub trait PeerConnector: Send {
    fn connect(
        &mut self,
        peer_id: &MemberId,
        role: Role,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerConnection>, PeerError>;
}

/// A negotiated (or negotiating) direct connection to one peer, delivering
/// messages reliably and in order once open.
pub trait PeerConnection: Send {
    /// Feed a negotiation payload received from the peer.
    fn signal(&mut self, payload: Value) -> Result<(), PeerError>;

    fn send(&mut self, msg: ChannelMessage) -> Result<(), PeerError>;

    fn close(&mut self);
}
