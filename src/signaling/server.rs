use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RoomManagerHandle;
use super::messages::{ClientMessage, ServerMessage};
use super::types::{MemberId, OutboundMessage, RoomId, SignalingError};

pub const DEFAULT_SIGNALING_PORT: u16 = 5000;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Ping cadence, and how long a Ping may go unanswered before the
/// connection is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            interval: PING_INTERVAL,
            timeout: PONG_TIMEOUT,
        }
    }
}

pub struct SignalingServer {
    handle: RoomManagerHandle,
    keepalive: Keepalive,
}

impl Default for SignalingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingServer {
    pub fn new() -> Self {
        Self {
            handle: RoomManagerHandle::spawn(),
            keepalive: Keepalive::default(),
        }
    }

    pub fn with_keepalive(mut self, keepalive: Keepalive) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Handle to the registry, shared with the diagnostics listener.
    pub fn handle(&self) -> RoomManagerHandle {
        self.handle.clone()
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling server listening on {}", addr);
        self.serve(listener).await
    }

    /// Accept connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            let handle = self.handle.clone();
            let keepalive = self.keepalive;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, keepalive).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

/// Per-connection lifecycle: Unjoined -> Joined -> Closed.
#[derive(Debug, Clone, PartialEq)]
enum ConnectionState {
    Unjoined,
    Joined { room_id: RoomId, member_id: MemberId },
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RoomManagerHandle,
    keepalive: Keepalive,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    info!("WebSocket connection from {}", addr);

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let mut state = ConnectionState::Unjoined;
    let mut ping_interval = tokio::time::interval(keepalive.interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    let closing = matches!(ctrl_msg, Message::Close(_));
                    if ws_tx.send(ctrl_msg).await.is_err() || closing {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", addr);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + keepalive.timeout);
                debug!("Ping sent to {}", addr);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", addr);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        if let Err(e) = handle_text_message(&text, &tx, &handle, &mut state).await {
                            warn!("Closing {}: {}", addr, e);
                            let _ = ctrl_tx.send(Message::Close(None));
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        warn!("Closing {}: binary frames are not part of the relay protocol", addr);
                        let _ = ctrl_tx.send(Message::Close(None));
                        break;
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", addr);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", addr);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if let ConnectionState::Joined { room_id, member_id } = &state {
        handle.leave_room(room_id, member_id).await;
    }

    // let a pending Close frame go out before tearing the writer down
    drop(tx);
    drop(ctrl_tx);
    let writer = send_task.abort_handle();
    if tokio::time::timeout(Duration::from_secs(1), send_task).await.is_err() {
        debug!("Writer for {} did not finish in time", addr);
        writer.abort();
    }
    info!("WebSocket disconnected: {}", addr);

    Ok(())
}

/// Errors returned from here are fatal to the connection.
async fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &RoomManagerHandle,
    state: &mut ConnectionState,
) -> Result<(), SignalingError> {
    let client_msg = ClientMessage::parse(text)?;

    let current = match &*state {
        ConnectionState::Unjoined => None,
        ConnectionState::Joined { room_id, member_id } => Some((room_id.clone(), member_id.clone())),
    };

    match (current, client_msg) {
        (None, ClientMessage::Create { room_id }) => {
            let joined = handle.create_room(room_id.clone(), tx.clone()).await?;
            *state = ConnectionState::Joined {
                room_id,
                member_id: joined.member_id,
            };
        }

        (None, ClientMessage::Join { room_id, member_id }) => {
            match handle.join_room(room_id.clone(), member_id, tx.clone()).await {
                Ok(joined) => {
                    *state = ConnectionState::Joined {
                        room_id,
                        member_id: joined.member_id,
                    };
                }
                Err(SignalingError::RoomNotFound(room_id)) => {
                    debug!("Join for missing room {}", room_id);
                    let reply = ServerMessage::RoomNonexistent { room_id };
                    let _ = tx.send(reply.to_outbound()?);
                }
                Err(e) => return Err(e),
            }
        }

        (None, ClientMessage::Signal { .. }) => {
            debug!("Ignoring signal before join");
        }

        (Some((room_id, member_id)), ClientMessage::Signal { peer_id, signal }) => {
            handle.signal(&room_id, &member_id, peer_id, signal).await;
        }

        (Some((room_id, _)), _) => {
            debug!("Ignoring create/join while already in room {}", room_id);
        }
    }

    Ok(())
}
