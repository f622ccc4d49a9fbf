//! wsrelay daemon - WebSocket broadcast relay
//!
//! This crate provides the core infrastructure for the relay daemon:
//! - `registry` - owned set of live client connections
//! - `connection` - per-socket frame reads and write attempts
//! - `broadcast` - fan-out of one sealed frame to every connection
//! - `handshake` - HTTP Upgrade exchange for freshly accepted sockets
//! - `server` - the single-task relay loop
//! - `lifecycle` - signal handling, restart budget, supervisor outcome
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      relayd daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  TcpListener ──accept──▶ handshake ──▶ ConnectionRegistry   │
//! │                                             │               │
//! │  ready client ──unseal──▶ broadcast ◀───────┘               │
//! │                               ▲                             │
//! │  EventSource ──get_unsent─────┘  (mark sent after fan-out)  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One linear loop body runs per tick; the registry is touched only by
//! the relay task, so no locking is needed.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Per-socket errors never unwind past the loop body

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod handshake;
pub mod lifecycle;
pub mod registry;
pub mod server;

// Re-exports for convenience
pub use config::RelayConfig;
pub use lifecycle::{spawn_signal_watcher, Outcome, ShutdownCause, ShutdownSignal};
pub use server::{RelayServer, ServerError};
