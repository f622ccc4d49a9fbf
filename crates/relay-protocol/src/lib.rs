//! Relay Protocol - WebSocket wire format for the wsrelay daemon
//!
//! Pure encode/decode for the subset of RFC 6455 the relay speaks:
//! single-frame, non-fragmented text messages plus the one-time HTTP
//! Upgrade handshake. No I/O lives here; the daemon owns the sockets.
//!
//! - `frame` - text-frame codec (`seal`/`unseal`, `FrameHeader`)
//! - `handshake` - `Sec-WebSocket-Key` extraction and accept-token
//!   derivation

pub mod frame;
pub mod handshake;

// Re-exports for convenience
pub use frame::{apply_mask, seal, seal_masked, unseal, FrameError, FrameHeader, LengthClass, Opcode};
pub use handshake::{accept_token, extract_key, upgrade_request, upgrade_response};
