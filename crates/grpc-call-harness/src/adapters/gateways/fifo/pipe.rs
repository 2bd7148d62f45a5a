//! Named pipes (FIFOs) carrying length-prefixed JSON values.
//!
//! Each frame is a 4-byte big-endian payload length followed by the payload.
//! A pipe end is opened lazily on first use; opening blocks until the peer has
//! opened the other end, so it runs on the blocking pool.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::PipeError;

/// Largest payload accepted on a pipe
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A named, unidirectional byte channel bound to a filesystem path
#[derive(Debug)]
pub struct FifoPipe {
    path: PathBuf,
    owned: bool,
    reader: Option<File>,
    writer: Option<File>,
}

impl FifoPipe {
    /// Make a fresh FIFO at `path`; it is removed again when this handle drops
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PipeError> {
        let path = path.into();
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| PipeError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return Err(match err.kind() {
                io::ErrorKind::AlreadyExists => PipeError::AlreadyExists(path),
                _ => PipeError::Io(err),
            });
        }

        tracing::trace!(path = %path.display(), "created fifo");
        Ok(Self {
            path,
            owned: true,
            reader: None,
            writer: None,
        })
    }

    /// Attach to a FIFO the peer created
    pub fn wrap(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: false,
            reader: None,
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one length-prefixed value
    pub async fn send<T: Serialize>(&mut self, value: &T) -> Result<(), PipeError> {
        let payload = serde_json::to_vec(value)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(PipeError::FrameTooLarge(payload.len()));
        }

        let writer = match self.writer {
            Some(ref mut writer) => writer,
            None => self.writer.insert(open(&self.path, Direction::Write).await?),
        };
        writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
        writer.write_all(&payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one value, or `None` once the writer has closed its end
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>, PipeError> {
        let reader = match self.reader {
            Some(ref mut reader) => reader,
            None => self.reader.insert(open(&self.path, Direction::Read).await?),
        };

        let mut header = [0u8; 4];
        if !read_full(reader, &mut header).await? {
            return Ok(None);
        }
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(PipeError::FrameTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        if !read_full(reader, &mut payload).await? && len > 0 {
            return Err(PipeError::Truncated);
        }
        Ok(Some(serde_json::from_slice(&payload)?))
    }

    /// Close both ends
    pub fn close(&mut self) {
        self.reader = None;
        self.writer = None;
    }
}

impl Drop for FifoPipe {
    fn drop(&mut self) {
        if self.owned {
            if let Err(err) = std::fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), error = %err, "failed to remove fifo");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

async fn open(path: &Path, direction: Direction) -> Result<File, PipeError> {
    let mut pending = PendingOpen {
        path: path.to_path_buf(),
        direction,
        done: false,
    };
    let target = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let mut options = std::fs::OpenOptions::new();
        match direction {
            Direction::Read => options.read(true),
            Direction::Write => options.write(true),
        };
        options.open(&target)
    })
    .await;
    pending.done = true;

    let file = result.map_err(io::Error::other)??;
    Ok(File::from_std(file))
}

/// Releases a blocking open whose future was dropped.
///
/// The open itself cannot be interrupted, so the opposite end is opened and
/// closed once without blocking to let it complete.
struct PendingOpen {
    path: PathBuf,
    direction: Direction,
    done: bool,
}

impl Drop for PendingOpen {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut options = std::fs::OpenOptions::new();
        match self.direction {
            Direction::Read => options.write(true),
            Direction::Write => options.read(true),
        };
        options.custom_flags(libc::O_NONBLOCK);
        if let Err(err) = options.open(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %err, "could not release abandoned open");
        }
    }
}

/// Fill `buf` completely.
///
/// Returns `Ok(false)` on end of stream before the first byte and
/// `PipeError::Truncated` on end of stream after it.
async fn read_full(reader: &mut File, buf: &mut [u8]) -> Result<bool, PipeError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(false)
            } else {
                Err(PipeError::Truncated)
            };
        }
        filled += n;
    }
    Ok(true)
}
