//! A single relayed client socket.
//!
//! Connections are stateless after the handshake: the relay only ever
//! reads one frame at a time with a non-blocking `try_read` and writes
//! sealed frames with a single non-blocking attempt. A connection is
//! created on accept and destroyed through the loop's disconnect path.

use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use relay_protocol::frame::{self, FrameError};

/// Identity of a registered connection, assigned on insert.
pub type ConnId = u64;

/// Room for a 64 KiB payload plus the largest frame header.
const READ_BUFFER_BYTES: usize = 65_550;

/// Result of one non-blocking read attempt on a client socket.
#[derive(Debug)]
pub enum ReadOutcome {
    /// No data pending
    Idle,

    /// One decoded, UTF-8-valid text message
    Message(String),

    /// Frame arrived but did not decode to a valid text payload;
    /// the message is dropped and the connection kept
    BadPayload(FrameError),

    /// Peer closed the socket (EOF)
    Closed,

    /// Transient I/O failure; the socket is dropped by the loop
    Failed(io::Error),
}

/// An upgraded client socket with its remote address for logging.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnId,
    stream: TcpStream,
    peer: SocketAddr,
    read_buf: Vec<u8>,
}

impl ClientConnection {
    pub(crate) fn new(id: ConnId, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id,
            stream,
            peer,
            read_buf: vec![0; READ_BUFFER_BYTES],
        }
    }

    /// Registry identity of this connection.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Remote address, for log lines.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Waits until the socket reports pending data or EOF.
    pub async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    /// Attempts to read and decode one frame without blocking.
    ///
    /// Each read is assumed to carry exactly one frame; there is no
    /// partial-frame reassembly.
    pub fn poll_message(&mut self) -> ReadOutcome {
        match self.stream.try_read(&mut self.read_buf) {
            Ok(0) => ReadOutcome::Closed,
            Ok(n) => match frame::unseal(&self.read_buf[..n]) {
                Ok(text) => ReadOutcome::Message(text),
                Err(err) => ReadOutcome::BadPayload(err),
            },
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => ReadOutcome::Idle,
            Err(err) => ReadOutcome::Failed(err),
        }
    }

    /// Makes one non-blocking attempt to write `frame` in full.
    pub fn try_send(&self, frame: &[u8]) -> io::Result<()> {
        let written = self.stream.try_write(frame)?;
        if written < frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {} bytes", frame.len()),
            ));
        }
        Ok(())
    }

    /// Closes the socket, ignoring errors (best-effort shutdown).
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }

    #[cfg(test)]
    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}
