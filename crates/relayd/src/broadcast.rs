//! Fan-out of one sealed frame to every registered connection.

use tracing::warn;

use crate::registry::ConnectionRegistry;

/// What one broadcast call attempted and how much of it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// One attempt per registered connection
    pub attempted: usize,

    /// Sends that returned an error; the sockets stay registered
    pub failed: usize,
}

/// Attempts one send of `frame` to every connection, in registry
/// order.
///
/// A failing send is logged and never blocks delivery to the remaining
/// connections. Removal is not this function's job: dead sockets are
/// evicted by the loop's disconnect path on their next read.
pub fn broadcast(registry: &ConnectionRegistry, frame: &[u8]) -> BroadcastReport {
    let mut report = BroadcastReport {
        attempted: 0,
        failed: 0,
    };

    for conn in registry.iter() {
        report.attempted += 1;
        if let Err(err) = conn.try_send(frame) {
            report.failed += 1;
            warn!(
                conn = conn.id(),
                peer = %conn.peer(),
                error = %err,
                "broadcast send failed"
            );
        }
    }

    report
}
