//! HTTP Upgrade handshake pieces (RFC 6455 §1.3 / §4).
//!
//! Pure string/byte functions; the daemon performs the socket reads
//! and writes. Key extraction is deliberately permissive: a request
//! without `Sec-WebSocket-Key` is answered with the token derived from
//! an empty key rather than rejected.

use base64::Engine as _;
use sha1::{Digest, Sha1};

/// Fixed GUID appended to the client key per RFC 6455 §1.3.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Extracts the `Sec-WebSocket-Key` header value via line matching.
///
/// Header names are matched case-insensitively; the value is trimmed.
pub fn extract_key(request: &str) -> Option<&str> {
    request.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("sec-websocket-key")
            .then(|| value.trim())
    })
}

/// Derives the accept token: `base64(SHA1(key ++ GUID))`.
pub fn accept_token(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Builds the fixed `101 Switching Protocols` response for `key`.
pub fn upgrade_response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_token(key)
    )
}

/// Builds a minimal client Upgrade request for `host` with `key`.
///
/// Counterpart of [`upgrade_response`] for client implementations and
/// tests.
pub fn upgrade_request(host: &str, key: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}
