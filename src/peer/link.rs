use super::connection::{PeerConnection, Role};
use super::PeerError;
use crate::signaling::MemberId;
use crate::transfer::{ChannelMessage, ReceiveSession};

/// A remote member, its connection, and the receiving side of the transfer
/// protocol for that connection.
pub struct PeerLink {
    peer_id: MemberId,
    role: Role,
    connection: Box<dyn PeerConnection>,
    open: bool,
    /// Whether our shared files have been streamed to this peer
    served: bool,
    session: ReceiveSession,
}

impl PeerLink {
    pub fn new(peer_id: MemberId, role: Role, connection: Box<dyn PeerConnection>) -> Self {
        Self {
            peer_id,
            role,
            connection,
            open: false,
            served: false,
            session: ReceiveSession::new(),
        }
    }

    pub fn peer_id(&self) -> &MemberId {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn mark_open(&mut self) {
        self.open = true;
    }

    pub fn is_served(&self) -> bool {
        self.served
    }

    pub(crate) fn mark_served(&mut self) {
        self.served = true;
    }

    pub fn session(&self) -> &ReceiveSession {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut ReceiveSession {
        &mut self.session
    }

    pub fn signal(&mut self, payload: serde_json::Value) -> Result<(), PeerError> {
        self.connection.signal(payload)
    }

    pub fn send(&mut self, msg: ChannelMessage) -> Result<(), PeerError> {
        self.connection.send(msg)
    }

    /// Close the connection, discarding any partially received file.
    pub fn close(mut self) {
        self.connection.close();
    }
}
