use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{CHUNK_SIZE, TransferError};

/// One message on the data channel, as the channel itself distinguishes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

/// Control operations, JSON tagged by `op`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Control {
    /// Ordered file names of the whole session
    Init { manifest: Vec<String> },
    Start { name: String, size: u64 },
    End,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Control(Control),
    Chunk(Bytes),
}

impl Frame {
    pub fn encode(&self) -> Result<ChannelMessage, TransferError> {
        match self {
            Frame::Control(control) => serde_json::to_string(control)
                .map(ChannelMessage::Text)
                .map_err(|e| TransferError::MalformedFrame(e.to_string())),
            Frame::Chunk(data) => Ok(ChannelMessage::Binary(data.clone())),
        }
    }

    pub fn decode(msg: ChannelMessage) -> Result<Self, TransferError> {
        match msg {
            ChannelMessage::Text(text) => serde_json::from_str(&text)
                .map(Frame::Control)
                .map_err(|e| TransferError::MalformedFrame(e.to_string())),
            ChannelMessage::Binary(data) if data.len() > CHUNK_SIZE => Err(
                TransferError::MalformedFrame(format!(
                    "chunk of {} bytes exceeds {}",
                    data.len(),
                    CHUNK_SIZE
                )),
            ),
            ChannelMessage::Binary(data) => Ok(Frame::Chunk(data)),
        }
    }

    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Control(Control::Init { .. }) => "init",
            Frame::Control(Control::Start { .. }) => "start",
            Frame::Control(Control::End) => "end",
            Frame::Control(Control::Finish) => "finish",
            Frame::Chunk(_) => "chunk",
        }
    }
}

impl From<Control> for Frame {
    fn from(control: Control) -> Self {
        Frame::Control(control)
    }
}
