use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use super::frame::{ChannelMessage, Control, Frame};
use super::{CHUNK_SIZE, TransferError};

/// A file offered to the room.
///
/// Path-backed files are read whole into memory when their turn comes;
/// nothing streams from disk.
#[derive(Debug, Clone)]
pub enum SharedFile {
    Memory { name: String, data: Bytes },
    Disk { name: String, path: PathBuf },
}

impl SharedFile {
    pub fn in_memory(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        SharedFile::Memory {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Named after the last path component.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        SharedFile::Disk {
            name,
            path: path.to_path_buf(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SharedFile::Memory { name, .. } | SharedFile::Disk { name, .. } => name,
        }
    }

    pub async fn load(&self) -> Result<Bytes, TransferError> {
        match self {
            SharedFile::Memory { data, .. } => Ok(data.clone()),
            SharedFile::Disk { name, path } => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|source| TransferError::Read {
                    name: name.clone(),
                    source,
                }),
        }
    }
}

pub fn manifest(files: &[SharedFile]) -> Vec<String> {
    files.iter().map(|f| f.name().to_string()).collect()
}

/// Split into [`CHUNK_SIZE`] slices sharing `data`'s allocation.
pub fn chunks(data: &Bytes) -> impl Iterator<Item = Bytes> + '_ {
    (0..data.len())
        .step_by(CHUNK_SIZE)
        .map(move |start| data.slice(start..(start + CHUNK_SIZE).min(data.len())))
}

/// Produce the whole session's frame sequence, handing each encoded message
/// to `send` in order: `init`, then `start`/chunks/`end` per file, then
/// `finish`. Each file is read once, however many receivers `send` fans out to.
pub async fn stream_files<F>(files: &[SharedFile], mut send: F) -> Result<(), TransferError>
where
    F: FnMut(&ChannelMessage),
{
    send(&Frame::from(Control::Init { manifest: manifest(files) }).encode()?);

    for file in files {
        let data = file.load().await?;
        debug!("Sending {} ({} bytes)", file.name(), data.len());

        send(
            &Frame::from(Control::Start {
                name: file.name().to_string(),
                size: data.len() as u64,
            })
            .encode()?,
        );
        for chunk in chunks(&data) {
            send(&ChannelMessage::Binary(chunk));
        }
        send(&Frame::from(Control::End).encode()?);
    }

    send(&Frame::from(Control::Finish).encode()?);
    Ok(())
}
