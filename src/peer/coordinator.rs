use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::PeerError;
use super::connection::{LinkEvent, LinkEventKind, PeerConnector, Role};
use super::link::PeerLink;
use crate::signaling::{ClientMessage, MemberId, RoomId, ServerMessage};
use crate::transfer::{FileStatus, Frame, ReceiveEvent, SharedFile, stream_files};

/// What the local participant gets to see of the session
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    Joined {
        room_id: RoomId,
        member_id: MemberId,
        peers: Vec<MemberId>,
    },
    PeerConnected(MemberId),
    PeerDisconnected(MemberId),
    Manifest {
        peer_id: MemberId,
        files: Vec<String>,
    },
    FileStarted {
        peer_id: MemberId,
        name: String,
        size: u64,
    },
    Progress {
        peer_id: MemberId,
        name: String,
        percent: u8,
    },
    FileReceived {
        peer_id: MemberId,
        name: String,
        data: Bytes,
    },
    TransferFinished {
        peer_id: MemberId,
        statuses: Vec<FileStatus>,
    },
    /// Our files went out to these peers
    SendFinished { peers: Vec<MemberId> },
    /// The session cannot continue
    Fatal(String),
}

/// Owns every [`PeerLink`] of the local participant and reacts to the relay
/// and to the links themselves, on a single task.
///
/// Events are never dropped. A bounded event channel slows the coordinator
/// down when full, and a closed one ends the session with
/// [`PeerError::EventsClosed`].
pub struct Coordinator<C> {
    connector: C,
    links: HashMap<MemberId, PeerLink>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    events: async_channel::Sender<CoordinatorEvent>,
    files: Vec<SharedFile>,
    member_id: Option<MemberId>,
}

impl<C: PeerConnector> Coordinator<C> {
    /// `outbound` goes to the signaling connection; `events` to the caller.
    pub fn new(
        connector: C,
        outbound: mpsc::UnboundedSender<ClientMessage>,
        events: async_channel::Sender<CoordinatorEvent>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            links: HashMap::new(),
            link_tx,
            link_rx,
            outbound,
            events,
            files: Vec::new(),
            member_id: None,
        }
    }

    /// Files to stream to every peer whose data channel opens.
    pub fn with_files(mut self, files: Vec<SharedFile>) -> Self {
        self.files = files;
        self
    }

    pub fn member_id(&self) -> Option<&MemberId> {
        self.member_id.as_ref()
    }

    pub fn link(&self, peer_id: &MemberId) -> Option<&PeerLink> {
        self.links.get(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.links.len()
    }

    pub async fn on_server_message(&mut self, msg: ServerMessage) -> Result<(), PeerError> {
        match msg {
            ServerMessage::Joined {
                room_id,
                member_id,
                peers,
            } => {
                info!("Joined room {} as {} ({} peers)", room_id, member_id, peers.len());
                self.member_id = Some(member_id.clone());
                for peer_id in &peers {
                    self.open_link(peer_id.clone(), Role::Responder).await?;
                }
                self.emit(CoordinatorEvent::Joined {
                    room_id,
                    member_id,
                    peers,
                })
                .await?;
            }

            ServerMessage::PeerJoined { peer_id } => {
                self.open_link(peer_id, Role::Initiator).await?;
            }

            ServerMessage::PeerLeft { peer_id } => {
                if self.drop_link(&peer_id).await? {
                    info!("Peer {} left", peer_id);
                }
            }

            ServerMessage::Signal { peer_id, signal } => match self.links.get_mut(&peer_id) {
                Some(link) => {
                    if let Err(e) = link.signal(signal) {
                        self.drop_link(&peer_id).await?;
                        return Err(e);
                    }
                }
                None => debug!("Dropping signal from unknown peer {}", peer_id),
            },

            ServerMessage::RoomNonexistent { room_id } => {
                return Err(PeerError::RoomNotFound(room_id));
            }
        }
        Ok(())
    }

    pub async fn on_link_event(&mut self, event: LinkEvent) -> Result<(), PeerError> {
        let LinkEvent { peer_id, kind } = event;
        let Some(link) = self.links.get_mut(&peer_id) else {
            debug!("Dropping link event from unknown peer {}", peer_id);
            return Ok(());
        };

        match kind {
            LinkEventKind::Signal(signal) => {
                let msg = ClientMessage::Signal {
                    peer_id: peer_id.clone(),
                    signal,
                };
                self.outbound
                    .send(msg)
                    .map_err(|_| PeerError::Signaling("signaling connection closed".to_string()))?;
            }

            LinkEventKind::Open => {
                link.mark_open();
                info!("Data channel open with {}", peer_id);
                self.emit(CoordinatorEvent::PeerConnected(peer_id)).await?;
                self.share().await?;
            }

            LinkEventKind::Message(msg) => {
                let outcome = Frame::decode(msg).and_then(|frame| link.session_mut().handle(frame));
                match outcome {
                    Ok(events) => {
                        for event in events {
                            self.emit(received(&peer_id, event)).await?;
                        }
                    }
                    Err(e) => {
                        warn!("Transfer from {} failed: {}", peer_id, e);
                        self.drop_link(&peer_id).await?;
                        return Err(e.into());
                    }
                }
            }

            LinkEventKind::Closed => {
                self.drop_link(&peer_id).await?;
            }

            LinkEventKind::Failed(e) => {
                warn!("Link to {} failed: {}", peer_id, e);
                self.drop_link(&peer_id).await?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Drive the session until the relay is gone and no links remain, or a
    /// fatal error occurs. On error every link is closed.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<Result<ServerMessage, PeerError>>,
    ) -> Result<(), PeerError> {
        let mut signaling_open = true;

        let result = loop {
            if !signaling_open && self.links.is_empty() {
                break Ok(());
            }

            tokio::select! {
                msg = inbound.recv(), if signaling_open => match msg {
                    Some(Ok(msg)) => {
                        if let Err(e) = self.on_server_message(msg).await {
                            break Err(e);
                        }
                    }
                    Some(Err(e)) => break Err(e),
                    None => {
                        debug!("Signaling connection closed");
                        signaling_open = false;
                    }
                },
                Some(event) = self.link_rx.recv() => {
                    if let Err(e) = self.on_link_event(event).await {
                        break Err(e);
                    }
                }
                else => break Ok(()),
            }
        };

        if let Err(e) = &result {
            // the receiver may be the thing that went away
            let _ = self.emit(CoordinatorEvent::Fatal(e.to_string())).await;
            let ids: Vec<_> = self.links.keys().cloned().collect();
            for id in ids {
                let _ = self.drop_link(&id).await;
            }
        }
        result
    }

    /// Next event reported by any link, for callers driving the
    /// coordinator by hand.
    pub async fn next_link_event(&mut self) -> Option<LinkEvent> {
        self.link_rx.recv().await
    }

    async fn open_link(&mut self, peer_id: MemberId, role: Role) -> Result<(), PeerError> {
        if self.member_id.as_ref() == Some(&peer_id) {
            return Ok(());
        }
        self.drop_link(&peer_id).await?;

        let connection = self.connector.connect(&peer_id, role, self.link_tx.clone())?;
        debug!("Opening link to {} as {:?}", peer_id, role);
        self.links
            .insert(peer_id.clone(), PeerLink::new(peer_id, role, connection));
        Ok(())
    }

    /// Close and forget a link. The link is closed even when announcing
    /// it fails.
    async fn drop_link(&mut self, peer_id: &MemberId) -> Result<bool, PeerError> {
        let Some(link) = self.links.remove(peer_id) else {
            return Ok(false);
        };
        link.close();
        self.emit(CoordinatorEvent::PeerDisconnected(peer_id.clone())).await?;
        Ok(true)
    }

    /// Stream our files to every open link not yet served. Chunks are
    /// shared between links; a link whose send fails is dropped.
    async fn share(&mut self) -> Result<(), PeerError> {
        if self.files.is_empty() {
            return Ok(());
        }

        let targets: Vec<MemberId> = self
            .links
            .values_mut()
            .filter(|l| l.is_open() && !l.is_served())
            .map(|l| {
                l.mark_served();
                l.peer_id().clone()
            })
            .collect();
        if targets.is_empty() {
            return Ok(());
        }
        info!("Sending {} files to {} peers", self.files.len(), targets.len());

        let links = &mut self.links;
        let mut failures: Vec<(MemberId, PeerError)> = Vec::new();
        stream_files(&self.files, |msg| {
            for id in &targets {
                if failures.iter().any(|(failed, _)| failed == id) {
                    continue;
                }
                if let Some(link) = links.get_mut(id) {
                    if let Err(e) = link.send(msg.clone()) {
                        failures.push((id.clone(), e));
                    }
                }
            }
        })
        .await?;

        let peers = targets
            .into_iter()
            .filter(|id| !failures.iter().any(|(failed, _)| failed == id))
            .collect();
        self.emit(CoordinatorEvent::SendFinished { peers }).await?;

        let mut first = None;
        for (id, e) in failures {
            warn!("Sending to {} failed: {}", id, e);
            self.drop_link(&id).await?;
            first.get_or_insert(e);
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn emit(&mut self, event: CoordinatorEvent) -> Result<(), PeerError> {
        self.events
            .send(event)
            .await
            .map_err(|_| PeerError::EventsClosed)
    }
}

fn received(peer_id: &MemberId, event: ReceiveEvent) -> CoordinatorEvent {
    let peer_id = peer_id.clone();
    match event {
        ReceiveEvent::Manifest(files) => CoordinatorEvent::Manifest { peer_id, files },
        ReceiveEvent::FileStarted { name, size } => CoordinatorEvent::FileStarted { peer_id, name, size },
        ReceiveEvent::Progress { name, percent } => CoordinatorEvent::Progress {
            peer_id,
            name,
            percent,
        },
        ReceiveEvent::FileCompleted { name, data } => CoordinatorEvent::FileReceived { peer_id, name, data },
        ReceiveEvent::Finished { statuses } => CoordinatorEvent::TransferFinished { peer_id, statuses },
    }
}
