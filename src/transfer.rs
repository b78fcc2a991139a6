//! File framing over an established data channel
//!
//! Control frames travel as text messages holding JSON, file content as
//! binary messages of at most [`CHUNK_SIZE`] bytes. The two never share a
//! message kind, so file bytes are never inspected for markers.

mod frame;
mod receiver;
mod sender;

pub use frame::{ChannelMessage, Control, Frame};
pub use receiver::{FileStatus, ReceiveEvent, ReceiveSession, ReceiveState};
pub use sender::{SharedFile, chunks, manifest, stream_files};

use thiserror::Error;

/// Maximum payload of one binary chunk frame (16 KiB).
pub const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unexpected {frame} frame while {state}")]
    UnexpectedFrame {
        state: &'static str,
        frame: &'static str,
    },

    #[error("{name}: declared {declared} bytes, received {received}")]
    SizeMismatch {
        name: String,
        declared: u64,
        received: u64,
    },

    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
