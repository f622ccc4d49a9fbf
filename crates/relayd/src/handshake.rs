//! HTTP Upgrade exchange on a freshly accepted socket.
//!
//! One bounded read of the request, one write of the fixed 101
//! response. Both run inline on the relay task, so a stalled client
//! here delays the tick; that matches the single-threaded model of the
//! deployed protocol. Failures are contained to the one socket, which
//! is closed without ever being registered.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use relay_protocol::handshake::{extract_key, upgrade_response};

/// Upper bound of the single Upgrade-request read.
pub const MAX_REQUEST_BYTES: usize = 10_000;

/// Performs the Upgrade exchange.
///
/// A request without `Sec-WebSocket-Key` is tolerated: the accept
/// token is derived from the empty string.
pub async fn upgrade(stream: &mut TcpStream, peer: SocketAddr) -> Result<(), HandshakeError> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let n = stream.read(&mut buf).await.map_err(HandshakeError::Read)?;
    if n == 0 {
        return Err(HandshakeError::ClosedDuringUpgrade);
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    let key = match extract_key(&request) {
        Some(key) => key,
        None => {
            warn!(peer = %peer, "upgrade request missing Sec-WebSocket-Key");
            ""
        }
    };

    let response = upgrade_response(key);
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(HandshakeError::Write)?;

    debug!(peer = %peer, "upgrade complete");
    Ok(())
}

/// Errors that can occur during the Upgrade exchange.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("failed to read upgrade request: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write upgrade response: {0}")]
    Write(#[source] std::io::Error),

    #[error("connection closed during upgrade")]
    ClosedDuringUpgrade,
}
