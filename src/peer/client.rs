use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::PeerError;
use crate::signaling::{ClientMessage, MemberId, RoomId, ServerMessage};

/// Client end of the signaling relay.
///
/// A background task moves [`ClientMessage`]s out and [`ServerMessage`]s in.
/// Anything unparseable from the server is delivered as an error and ends
/// the connection.
pub struct SignalingClient {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    inbound: mpsc::UnboundedReceiver<Result<ServerMessage, PeerError>>,
}

impl SignalingClient {
    pub async fn connect(url: &str) -> Result<Self, PeerError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| PeerError::Signaling(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = out_rx.recv() => {
                        let Some(msg) = msg else {
                            let _ = ws_tx.close().await;
                            break;
                        };
                        let text = match serde_json::to_string(&msg) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Dropping unserializable message: {}", e);
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }

                    frame = ws_rx.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let parsed = ServerMessage::parse(&text)
                                .map_err(|e| PeerError::Signaling(e.to_string()));
                            let fatal = parsed.is_err();
                            if in_tx.send(parsed).is_err() || fatal {
                                let _ = ws_tx.close().await;
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = in_tx.send(Err(PeerError::Signaling(e.to_string())));
                            break;
                        }
                    },
                }
            }
            debug!("Signaling client stopped");
        });

        Ok(Self {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    /// Whether `room_id` can be joined, without staying in it.
    ///
    /// Ids that are not link tokens are turned away before connecting. Any
    /// other id is joined and the connection closed on the reply, so the
    /// room's members see this client arrive and leave.
    pub async fn room_exists(url: &str, room_id: &RoomId) -> Result<bool, PeerError> {
        if !room_id.is_link_token() {
            debug!("{} is not a room link", room_id);
            return Ok(false);
        }

        let mut client = Self::connect(url).await?;
        client.join(room_id.clone(), None)?;
        loop {
            match client.recv().await {
                Some(Ok(ServerMessage::Joined { .. })) => return Ok(true),
                Some(Ok(ServerMessage::RoomNonexistent { .. })) => return Ok(false),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
                None => return Err(PeerError::Signaling("relay closed before replying".to_string())),
            }
        }
    }

    /// Create (or re-enter) `room_id` and join it.
    pub fn create(&self, room_id: RoomId) -> Result<(), PeerError> {
        self.send(ClientMessage::Create { room_id })
    }

    pub fn join(&self, room_id: RoomId, member_id: Option<MemberId>) -> Result<(), PeerError> {
        self.send(ClientMessage::Join { room_id, member_id })
    }

    pub async fn recv(&mut self) -> Option<Result<ServerMessage, PeerError>> {
        self.inbound.recv().await
    }

    /// Split into the halves a [`super::Coordinator`] consumes.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<ClientMessage>,
        mpsc::UnboundedReceiver<Result<ServerMessage, PeerError>>,
    ) {
        (self.outbound, self.inbound)
    }

    fn send(&self, msg: ClientMessage) -> Result<(), PeerError> {
        self.outbound
            .send(msg)
            .map_err(|_| PeerError::Signaling("signaling connection closed".to_string()))
    }
}
