//! In-process stand-in for a negotiated data channel.
//!
//! Negotiation is a two-message offer/answer exchange carried as ordinary
//! opaque signals, so it goes through the real relay when one is used. Once
//! the answer lands, both ends get [`LinkEventKind::Open`] and messages flow
//! over tokio channels, in order and without loss.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::PeerError;
use super::connection::{LinkEvent, LinkEventKind, PeerConnection, PeerConnector, Role};
use crate::signaling::MemberId;
use crate::transfer::ChannelMessage;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Handshake {
    Offer { token: u64 },
    Answer { token: u64 },
}

/// One end as seen from the other: where to deliver, and under which
/// peer id the owning coordinator knows the sender.
#[derive(Debug, Clone)]
struct Endpoint {
    events: mpsc::UnboundedSender<LinkEvent>,
    peer_id: MemberId,
}

impl Endpoint {
    fn deliver(&self, kind: LinkEventKind) -> bool {
        self.events
            .send(LinkEvent::new(self.peer_id.clone(), kind))
            .is_ok()
    }
}

#[derive(Debug)]
enum Pending {
    Offered(Endpoint),
    Answered(Endpoint),
}

/// Rendezvous table shared by every connector of one test or demo.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    pending: Arc<Mutex<HashMap<u64, Pending>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            network: self.clone(),
        }
    }

    fn insert(&self, token: u64, entry: Pending) -> Result<(), PeerError> {
        self.pending
            .lock()
            .map_err(|_| poisoned())?
            .insert(token, entry);
        Ok(())
    }

    fn take(&self, token: u64) -> Result<Option<Pending>, PeerError> {
        Ok(self.pending.lock().map_err(|_| poisoned())?.remove(&token))
    }
}

fn poisoned() -> PeerError {
    PeerError::NegotiationFailure("memory network lock poisoned".to_string())
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    network: MemoryNetwork,
}

impl PeerConnector for MemoryConnector {
    fn connect(
        &mut self,
        peer_id: &MemberId,
        role: Role,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerConnection>, PeerError> {
        let local = Endpoint {
            events,
            peer_id: peer_id.clone(),
        };

        let token = match role {
            Role::Initiator => {
                let token: u64 = rand::rng().random();
                self.network.insert(token, Pending::Offered(local.clone()))?;
                let offer = serde_json::to_value(Handshake::Offer { token })
                    .map_err(|e| PeerError::NegotiationFailure(e.to_string()))?;
                local.deliver(LinkEventKind::Signal(offer));
                Some(token)
            }
            Role::Responder => None,
        };

        Ok(Box::new(MemoryConnection {
            network: self.network.clone(),
            role,
            local,
            token,
            remote: None,
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    network: MemoryNetwork,
    role: Role,
    local: Endpoint,
    token: Option<u64>,
    remote: Option<Endpoint>,
    closed: bool,
}

impl PeerConnection for MemoryConnection {
    fn signal(&mut self, payload: Value) -> Result<(), PeerError> {
        let handshake: Handshake = serde_json::from_value(payload)
            .map_err(|e| PeerError::NegotiationFailure(format!("unrecognized signal: {}", e)))?;

        match (self.role, handshake) {
            (Role::Responder, Handshake::Offer { token }) => {
                let Some(Pending::Offered(initiator)) = self.network.take(token)? else {
                    return Err(PeerError::NegotiationFailure(format!("unknown offer {}", token)));
                };
                self.network.insert(token, Pending::Answered(self.local.clone()))?;
                self.remote = Some(initiator);
                self.token = Some(token);

                let answer = serde_json::to_value(Handshake::Answer { token })
                    .map_err(|e| PeerError::NegotiationFailure(e.to_string()))?;
                self.local.deliver(LinkEventKind::Signal(answer));
            }

            (Role::Initiator, Handshake::Answer { token }) if self.token == Some(token) => {
                let Some(Pending::Answered(responder)) = self.network.take(token)? else {
                    return Err(PeerError::NegotiationFailure(format!("unknown answer {}", token)));
                };
                debug!("Memory channel {} open", token);
                // responder hears Open before any message we send
                responder.deliver(LinkEventKind::Open);
                self.local.deliver(LinkEventKind::Open);
                self.remote = Some(responder);
            }

            (role, handshake) => {
                return Err(PeerError::NegotiationFailure(format!(
                    "{:?} cannot accept {:?}",
                    role, handshake
                )));
            }
        }
        Ok(())
    }

    fn send(&mut self, msg: ChannelMessage) -> Result<(), PeerError> {
        let remote = self
            .remote
            .as_ref()
            .filter(|_| !self.closed)
            .ok_or_else(|| PeerError::ChannelError("data channel not open".to_string()))?;
        if remote.deliver(LinkEventKind::Message(msg)) {
            Ok(())
        } else {
            Err(PeerError::ChannelError("peer went away".to_string()))
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(remote) = self.remote.take() {
            remote.deliver(LinkEventKind::Closed);
        }
        if let Some(token) = self.token {
            let _ = self.network.take(token);
        }
    }
}
