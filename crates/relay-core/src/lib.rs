//! Relay Core - Shared types for the wsrelay broadcast daemon
//!
//! This crate provides the domain types shared between the daemon
//! (relayd) and the surrounding application that produces events:
//! - `EventRecord` / `EventId` - rows drained from the outbound queue
//! - `EventSource` - the boundary trait the daemon polls each tick
//! - `MemoryEventSource` - in-process queue implementation
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod event;
pub mod source;

// Re-exports for convenience
pub use error::{EventSourceError, EventSourceResult};
pub use event::{EventId, EventRecord};
pub use source::{EventSource, MemoryEventSource};
