use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::ServerMessage;
use super::types::{Member, MemberId, OutboundMessage, Room, RoomId, SignalingError};

/// Room id -> members. Only the room manager actor holds one of these.
#[derive(Debug, Default)]
pub(crate) struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an empty room unless one already exists.
    pub fn create_room(&mut self, room_id: &RoomId) {
        if !self.contains(room_id) {
            self.rooms.insert(room_id.clone(), Room::default());
            info!("Room created: {}", room_id);
        }
    }

    /// Add a member and return the ids of the members already present.
    ///
    /// A requested id that is already taken in the room is replaced by a
    /// generated one. The id actually assigned comes back alongside the peers.
    pub fn join(
        &mut self,
        room_id: &RoomId,
        requested: Option<MemberId>,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<(MemberId, Vec<MemberId>), SignalingError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.clone()))?;

        let member_id = match requested {
            Some(id) if room.contains(&id) => {
                warn!("Member id {} already taken in room {}, generating one", id, room_id);
                generate_unique(room)
            }
            Some(id) => id,
            None => generate_unique(room),
        };

        let peers = room.member_ids();
        room.members.push(Member {
            id: member_id.clone(),
            tx,
        });

        info!("Member {} joined room {} ({} present)", member_id, room_id, peers.len());
        Ok((member_id, peers))
    }

    /// Remove a member, announce the departure, and drop the room once empty.
    pub fn leave(&mut self, room_id: &RoomId, member_id: &MemberId) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if room.remove(member_id).is_none() {
            return;
        }
        info!("Member {} left room {}", member_id, room_id);

        if room.members.is_empty() {
            self.rooms.remove(room_id);
            info!("Room {} removed (empty)", room_id);
            return;
        }

        let notice = ServerMessage::PeerLeft {
            peer_id: member_id.clone(),
        };
        self.broadcast(room_id, Some(member_id), &notice);
    }

    /// Deliver to every member of the room except `sender`.
    pub fn broadcast(&self, room_id: &RoomId, sender: Option<&MemberId>, msg: &ServerMessage) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        match msg.to_outbound() {
            Ok(out) => room.broadcast(sender, &out),
            Err(e) => error!("Dropping broadcast to room {}: {}", room_id, e),
        }
    }

    /// Send to a single member. Returns false if it is not in the room.
    pub fn send_to(&self, room_id: &RoomId, member_id: &MemberId, msg: &ServerMessage) -> bool {
        let Some(member) = self.rooms.get(room_id).and_then(|r| r.get(member_id)) else {
            return false;
        };
        match msg.to_outbound() {
            Ok(out) => member.tx.send(out).is_ok(),
            Err(e) => {
                error!("Dropping message to {}: {}", member_id, e);
                false
            }
        }
    }

    /// Forward a negotiation payload to `to`, tagged with `from`.
    /// Targets outside the sender's room are dropped.
    pub fn relay(&self, room_id: &RoomId, from: &MemberId, to: &MemberId, signal: Value) -> bool {
        let in_room = self
            .rooms
            .get(room_id)
            .is_some_and(|r| r.contains(from) && r.contains(to));
        if !in_room {
            debug!("Dropping signal {} -> {}: peer unreachable", from, to);
            return false;
        }
        let msg = ServerMessage::Signal {
            peer_id: from.clone(),
            signal,
        };
        self.send_to(room_id, to, &msg)
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Snapshot of every room and its members in join order.
    pub fn list(&self) -> BTreeMap<RoomId, Vec<MemberId>> {
        self.rooms
            .iter()
            .map(|(id, room)| (id.clone(), room.member_ids()))
            .collect()
    }
}

fn generate_unique(room: &Room) -> MemberId {
    loop {
        let id = MemberId::generate();
        if !room.contains(&id) {
            return id;
        }
    }
}
