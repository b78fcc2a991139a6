use bytes::{Bytes, BytesMut};
use tracing::debug;

use super::frame::{Control, Frame};
use super::{CHUNK_SIZE, TransferError};

/// Upfront buffer reservation per file. The declared size is the sender's
/// word, so larger files grow the buffer as chunks arrive.
const MAX_PREALLOC: usize = 4 * CHUNK_SIZE;

/// Completion of one manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub name: String,
    pub complete: bool,
}

#[derive(Debug)]
pub enum ReceiveState {
    /// Waiting for `init`
    Idle,
    /// Waiting for `start` or `finish`
    AwaitingFile,
    Receiving {
        name: String,
        size: u64,
        buffer: BytesMut,
        percent: u8,
    },
}

impl ReceiveState {
    pub fn name(&self) -> &'static str {
        match self {
            ReceiveState::Idle => "idle",
            ReceiveState::AwaitingFile => "awaiting file",
            ReceiveState::Receiving { .. } => "receiving",
        }
    }
}

/// What the receiver observed after one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    Manifest(Vec<String>),
    FileStarted { name: String, size: u64 },
    Progress { name: String, percent: u8 },
    FileCompleted { name: String, data: Bytes },
    Finished { statuses: Vec<FileStatus> },
}

/// Receiving half of the framing protocol for one peer link.
#[derive(Debug)]
pub struct ReceiveSession {
    state: ReceiveState,
    statuses: Vec<FileStatus>,
}

impl Default for ReceiveSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveSession {
    pub fn new() -> Self {
        Self {
            state: ReceiveState::Idle,
            statuses: Vec::new(),
        }
    }

    pub fn state(&self) -> &ReceiveState {
        &self.state
    }

    pub fn statuses(&self) -> &[FileStatus] {
        &self.statuses
    }

    /// Whether a session is underway (between `init` and `finish`).
    pub fn is_active(&self) -> bool {
        !matches!(self.state, ReceiveState::Idle)
    }

    /// Advance the state machine by one frame.
    ///
    /// Errors leave the session unusable; the owning link is expected to be
    /// torn down.
    pub fn handle(&mut self, frame: Frame) -> Result<Vec<ReceiveEvent>, TransferError> {
        let state = std::mem::replace(&mut self.state, ReceiveState::Idle);

        match (state, frame) {
            (ReceiveState::Idle, Frame::Control(Control::Init { manifest })) => {
                self.statuses = manifest
                    .iter()
                    .map(|name| FileStatus {
                        name: name.clone(),
                        complete: false,
                    })
                    .collect();
                self.state = ReceiveState::AwaitingFile;
                Ok(vec![ReceiveEvent::Manifest(manifest)])
            }

            (ReceiveState::AwaitingFile, Frame::Control(Control::Start { name, size })) => {
                debug!("Receiving {} ({} bytes)", name, size);
                let capacity = usize::try_from(size).map_or(MAX_PREALLOC, |s| s.min(MAX_PREALLOC));
                self.state = ReceiveState::Receiving {
                    name: name.clone(),
                    size,
                    buffer: BytesMut::with_capacity(capacity),
                    percent: 0,
                };
                Ok(vec![ReceiveEvent::FileStarted { name, size }])
            }

            (ReceiveState::AwaitingFile, Frame::Control(Control::Finish)) => {
                let statuses = std::mem::take(&mut self.statuses);
                Ok(vec![ReceiveEvent::Finished { statuses }])
            }

            (
                ReceiveState::Receiving {
                    name,
                    size,
                    mut buffer,
                    percent,
                },
                Frame::Chunk(data),
            ) => {
                buffer.extend_from_slice(&data);
                // ceil can only grow with the buffer, but a lying sender can
                // push it past 100
                let percent = progress(buffer.len() as u64, size).max(percent);
                let event = ReceiveEvent::Progress {
                    name: name.clone(),
                    percent,
                };
                self.state = ReceiveState::Receiving {
                    name,
                    size,
                    buffer,
                    percent,
                };
                Ok(vec![event])
            }

            (ReceiveState::Receiving { name, size, buffer, .. }, Frame::Control(Control::End)) => {
                let received = buffer.len() as u64;
                if received != size {
                    return Err(TransferError::SizeMismatch {
                        name,
                        declared: size,
                        received,
                    });
                }
                self.mark_complete(&name);
                self.state = ReceiveState::AwaitingFile;
                Ok(vec![
                    ReceiveEvent::Progress {
                        name: name.clone(),
                        percent: 100,
                    },
                    ReceiveEvent::FileCompleted {
                        name,
                        data: buffer.freeze(),
                    },
                ])
            }

            (state, frame) => Err(TransferError::UnexpectedFrame {
                state: state.name(),
                frame: frame.kind(),
            }),
        }
    }

    fn mark_complete(&mut self, name: &str) {
        match self.statuses.iter_mut().find(|s| s.name == name && !s.complete) {
            Some(status) => status.complete = true,
            None => self.statuses.push(FileStatus {
                name: name.to_string(),
                complete: true,
            }),
        }
    }
}

/// `ceil(received / size * 100)`, capped at 100. An empty file is complete.
fn progress(received: u64, size: u64) -> u8 {
    if size == 0 {
        return 100;
    }
    let percent = (u128::from(received) * 100).div_ceil(u128::from(size));
    percent.min(100) as u8
}
