//! Control socket for the display daemon
//!
//! Every frame is a little-endian u32 byte count followed by that many bytes
//! of JSON. A connection carries any number of request/response pairs.

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

mod handler;
mod messages;
pub use handler::spawn_ipc_listener;
pub use messages::{DisplayRequest, DisplayResponse};

use crate::constants::ipc::{MAX_MESSAGE_SIZE, SOCKET_NAME};

/// `$XDG_RUNTIME_DIR/<SOCKET_NAME>`, or under the cache dir outside a session
pub fn default_socket_path() -> Result<PathBuf> {
    let base = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime) => PathBuf::from(runtime),
        None => dirs::cache_dir().context("Neither XDG_RUNTIME_DIR nor a cache dir is available")?,
    };
    Ok(base.join(SOCKET_NAME))
}

pub struct DisplayClient {
    stream: UnixStream,
}

impl DisplayClient {
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("Display daemon not reachable at {}", path.display()))?;
        Ok(Self { stream })
    }

    /// One round trip
    pub fn request(&mut self, req: DisplayRequest) -> Result<DisplayResponse> {
        write_message(&mut self.stream, &req)?;
        read_message(&mut self.stream)
    }
}

/// Owner-only listening socket; the socket file goes away with the server
pub struct DisplayServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl DisplayServer {
    /// Binds `socket_path`, replacing a leftover socket from an earlier run
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(dir) = socket_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create socket dir {}", dir.display()))?;
        }
        match std::fs::remove_file(&socket_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(e).with_context(|| format!("Cannot replace {}", socket_path.display()));
            }
            _ => {}
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Cannot listen on {}", socket_path.display()))?;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Cannot restrict {}", socket_path.display()))?;

        Ok(Self { listener, socket_path })
    }

    /// Blocks until a client connects
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _) = self.listener.accept().context("accept() on display socket failed")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for DisplayServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

pub(crate) fn write_message<W: Write, T: Serialize>(stream: &mut W, msg: &T) -> Result<()> {
    let body = serde_json::to_vec(msg).context("Cannot encode IPC message")?;
    let len = u32::try_from(body.len()).context("IPC message does not fit a frame")?;

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    stream.write_all(&frame).context("Cannot send IPC frame")?;
    stream.flush().context("Cannot flush IPC stream")
}

pub(crate) fn read_message<R: Read, T: DeserializeOwned>(stream: &mut R) -> Result<T> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).context("IPC peer closed before frame header")?;

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_MESSAGE_SIZE {
        bail!("IPC frame of {} bytes exceeds the {} byte limit", len, MAX_MESSAGE_SIZE);
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).context("IPC frame truncated")?;
    serde_json::from_slice(&body).context("Cannot decode IPC message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_message_framing() {
        let mut buf = Vec::new();
        let req = DisplayRequest::SwitchMode { mode: 3, name: "HDMI-1".to_string() };
        write_message(&mut buf, &req).unwrap();

        let len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, buf.len() - 4);

        let decoded: DisplayRequest = read_message(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut buf = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(b"{}");
        let result: Result<DisplayRequest> = read_message(&mut Cursor::new(buf));
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_message_rejected() {
        let mut buf = 10u32.to_le_bytes().to_vec();
        buf.extend_from_slice(b"\"Ping\"");
        let result: Result<DisplayRequest> = read_message(&mut Cursor::new(buf));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_removes_socket_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("display.sock");
        {
            let server = DisplayServer::bind_to(path.clone()).unwrap();
            assert_eq!(server.path(), path.as_path());
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
