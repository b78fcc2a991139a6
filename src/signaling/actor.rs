use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::ServerMessage;
use super::registry::RoomRegistry;
use super::types::{MemberId, OutboundMessage, RoomId, SignalingError};

/// Commands sent to the room manager actor
pub(crate) enum RoomCommand {
    /// Create the room if unseen, then join it
    Create {
        room_id: RoomId,
        member_tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<Result<Joined, SignalingError>>,
    },
    Join {
        room_id: RoomId,
        member_id: Option<MemberId>,
        member_tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<Result<Joined, SignalingError>>,
    },
    Leave {
        room_id: RoomId,
        member_id: MemberId,
    },
    Signal {
        room_id: RoomId,
        from: MemberId,
        to: MemberId,
        signal: Value,
    },
    Broadcast {
        room_id: RoomId,
        sender: Option<MemberId>,
        message: ServerMessage,
    },
    ListRooms {
        reply: oneshot::Sender<BTreeMap<RoomId, Vec<MemberId>>>,
    },
}

/// Result of a successful create/join
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub member_id: MemberId,
    pub peers: Vec<MemberId>,
}

pub(crate) async fn room_manager_actor(mut rx: mpsc::Receiver<RoomCommand>) {
    let mut registry = RoomRegistry::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RoomCommand::Create {
                room_id,
                member_tx,
                reply,
            } => {
                registry.create_room(&room_id);
                let result = admit(&mut registry, room_id, None, member_tx);
                let _ = reply.send(result);
            }

            RoomCommand::Join {
                room_id,
                member_id,
                member_tx,
                reply,
            } => {
                let result = admit(&mut registry, room_id, member_id, member_tx);
                let _ = reply.send(result);
            }

            RoomCommand::Leave { room_id, member_id } => {
                registry.leave(&room_id, &member_id);
            }

            RoomCommand::Signal {
                room_id,
                from,
                to,
                signal,
            } => {
                registry.relay(&room_id, &from, &to, signal);
            }

            RoomCommand::Broadcast {
                room_id,
                sender,
                message,
            } => {
                registry.broadcast(&room_id, sender.as_ref(), &message);
            }

            RoomCommand::ListRooms { reply } => {
                let _ = reply.send(registry.list());
            }
        }
    }

    debug!("Room manager stopped");
}

/// Join, acknowledge to the newcomer, then announce it to the others.
///
/// The acknowledgement is queued on the newcomer's channel inside the same
/// actor turn, so it always precedes any signal an existing member sends in
/// reaction to `peer-joined`.
fn admit(
    registry: &mut RoomRegistry,
    room_id: RoomId,
    member_id: Option<MemberId>,
    member_tx: mpsc::UnboundedSender<OutboundMessage>,
) -> Result<Joined, SignalingError> {
    let (member_id, peers) = registry.join(&room_id, member_id, member_tx)?;

    let ack = ServerMessage::Joined {
        room_id: room_id.clone(),
        member_id: member_id.clone(),
        peers: peers.clone(),
    };
    registry.send_to(&room_id, &member_id, &ack);

    let notice = ServerMessage::PeerJoined {
        peer_id: member_id.clone(),
    };
    registry.broadcast(&room_id, Some(&member_id), &notice);

    info!("Member {} admitted to room {}", member_id, room_id);
    Ok(Joined { member_id, peers })
}

/// Handle to communicate with the room manager actor
#[derive(Clone)]
pub struct RoomManagerHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
}

impl RoomManagerHandle {
    /// Spawn the actor on the current runtime and return a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<RoomCommand>(1024);
        tokio::spawn(room_manager_actor(rx));
        Self { tx }
    }

    /// Create a room (no-op if present) and join it
    pub async fn create_room(
        &self,
        room_id: RoomId,
        member_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<Joined, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Create {
            room_id,
            member_tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| closed())?
    }

    /// Join an existing room
    pub async fn join_room(
        &self,
        room_id: RoomId,
        member_id: Option<MemberId>,
        member_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<Joined, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            room_id,
            member_id,
            member_tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| closed())?
    }

    /// Leave a room. Unknown rooms or members are ignored.
    pub async fn leave_room(&self, room_id: &RoomId, member_id: &MemberId) {
        let _ = self
            .send(RoomCommand::Leave {
                room_id: room_id.clone(),
                member_id: member_id.clone(),
            })
            .await;
    }

    /// Relay a negotiation payload; dropped if `to` is not in the room
    pub async fn signal(&self, room_id: &RoomId, from: &MemberId, to: MemberId, signal: Value) {
        let _ = self
            .send(RoomCommand::Signal {
                room_id: room_id.clone(),
                from: from.clone(),
                to,
                signal,
            })
            .await;
    }

    /// Deliver a message to every member except `sender`
    pub async fn broadcast(&self, room_id: &RoomId, sender: Option<&MemberId>, message: ServerMessage) {
        let _ = self
            .send(RoomCommand::Broadcast {
                room_id: room_id.clone(),
                sender: sender.cloned(),
                message,
            })
            .await;
    }

    /// Every room with its members, for diagnostics
    pub async fn list_rooms(&self) -> Result<BTreeMap<RoomId, Vec<MemberId>>, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::ListRooms { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| closed())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), SignalingError> {
        self.tx.send(cmd).await.map_err(|_| closed())
    }
}

fn closed() -> SignalingError {
    SignalingError::Internal("actor channel closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recv_all(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(ServerMessage::parse(msg.as_str()).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn join_before_create_is_room_not_found() {
        let handle = RoomManagerHandle::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = handle
            .join_room(RoomId::from("missing1"), None, tx)
            .await
            .unwrap_err();

        assert!(matches!(err, SignalingError::RoomNotFound(_)));
        assert!(recv_all(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn create_then_join_announces_newcomer() {
        let handle = RoomManagerHandle::spawn();
        let room = RoomId::from("room0001");

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let a = handle.create_room(room.clone(), tx_a).await.unwrap();
        assert!(a.peers.is_empty());

        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let b = handle.join_room(room.clone(), None, tx_b).await.unwrap();
        assert_eq!(b.peers, vec![a.member_id.clone()]);

        assert_eq!(
            recv_all(&mut rx_a),
            vec![
                ServerMessage::Joined {
                    room_id: room.clone(),
                    member_id: a.member_id.clone(),
                    peers: vec![],
                },
                ServerMessage::PeerJoined {
                    peer_id: b.member_id.clone()
                },
            ]
        );
        assert_eq!(
            recv_all(&mut rx_b),
            vec![ServerMessage::Joined {
                room_id: room,
                member_id: b.member_id,
                peers: vec![a.member_id],
            }]
        );
    }

    #[tokio::test]
    async fn signal_is_relayed_with_sender_id() {
        let handle = RoomManagerHandle::spawn();
        let room = RoomId::from("room0001");
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = handle.create_room(room.clone(), tx_a).await.unwrap();
        let b = handle.join_room(room.clone(), None, tx_b).await.unwrap();
        recv_all(&mut rx_b);

        handle
            .signal(&room, &a.member_id, b.member_id.clone(), json!({"offer": 1}))
            .await;
        // list_rooms round-trips through the actor, so the signal is processed
        handle.list_rooms().await.unwrap();

        assert_eq!(
            recv_all(&mut rx_b),
            vec![ServerMessage::Signal {
                peer_id: a.member_id,
                signal: json!({"offer": 1}),
            }]
        );
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let handle = RoomManagerHandle::spawn();
        let room = RoomId::from("room0001");
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = handle.create_room(room.clone(), tx_a).await.unwrap();
        handle.join_room(room.clone(), None, tx_b).await.unwrap();
        recv_all(&mut rx_a);
        recv_all(&mut rx_b);

        let msg = ServerMessage::PeerJoined {
            peer_id: MemberId::from("synthetic"),
        };
        handle.broadcast(&room, Some(&a.member_id), msg.clone()).await;
        handle.list_rooms().await.unwrap();

        assert!(recv_all(&mut rx_a).is_empty());
        assert_eq!(recv_all(&mut rx_b), vec![msg]);
    }

    #[tokio::test]
    async fn last_leave_removes_room() {
        let handle = RoomManagerHandle::spawn();
        let room = RoomId::from("room0001");
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = handle.create_room(room.clone(), tx_a).await.unwrap();
        let b = handle.join_room(room.clone(), None, tx_b).await.unwrap();

        handle.leave_room(&room, &a.member_id).await;
        let rooms = handle.list_rooms().await.unwrap();
        assert_eq!(rooms[&room], vec![b.member_id.clone()]);

        handle.leave_room(&room, &b.member_id).await;
        assert!(handle.list_rooms().await.unwrap().is_empty());
    }
}
