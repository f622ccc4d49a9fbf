//! The relay loop: accept, upgrade, relay, poll, broadcast.
//!
//! A single task owns the listener, the registry, and the event-source
//! handle. Each tick is bounded by the readiness timeout, which also
//! paces event-source polling:
//!
//! 1. check the restart budget;
//! 2. wait for readiness over the listener, every client socket, and
//!    the shutdown signal;
//! 3. admit at most one new connection (handshake + register);
//! 4. sweep ready clients in registry order and relay their messages;
//! 5. drain the event source and mark broadcast rows sent.
//!
//! Within one tick, client-relayed messages are broadcast before
//! event-source rows. There is no ordering guarantee across ticks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use relay_core::EventSource;
use relay_protocol::frame;

use crate::broadcast::broadcast;
use crate::config::RelayConfig;
use crate::connection::{ConnId, ReadOutcome};
use crate::handshake;
use crate::lifecycle::{Outcome, ShutdownCause, ShutdownSignal};
use crate::registry::ConnectionRegistry;

/// What one readiness wait resolved to.
enum Readiness {
    /// Listener produced a connection
    Accepted(TcpStream, SocketAddr),

    /// Listener was ready but accept failed (non-fatal)
    AcceptFailed(std::io::Error),

    /// At least one client socket has pending data or EOF
    ClientReady,

    /// Timeout elapsed; fall through to the event-source poll
    TimedOut,

    /// Shutdown was triggered while waiting
    Shutdown,
}

/// The broadcast relay server.
///
/// Bound separately from [`run`](RelayServer::run) so that a failure
/// to create the listening socket is fatal at startup and never enters
/// the restart path.
pub struct RelayServer {
    config: RelayConfig,
    listener: TcpListener,
    registry: ConnectionRegistry,
    events: Arc<dyn EventSource>,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("config", &self.config)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl RelayServer {
    /// Binds `0.0.0.0:<port>` and prepares an empty registry.
    pub async fn bind(
        config: RelayConfig,
        events: Arc<dyn EventSource>,
        shutdown: ShutdownSignal,
    ) -> Result<Self, ServerError> {
        let port = config.port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;

        Ok(Self {
            config,
            listener,
            registry: ConnectionRegistry::new(),
            events,
            shutdown,
        })
    }

    /// Address the listener actually bound (port 0 resolves here).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Addr)
    }

    /// Runs the relay loop until shutdown, then closes every socket.
    ///
    /// Returns the supervisor outcome derived from the shutdown cause.
    pub async fn run(mut self) -> Outcome {
        let started = Instant::now();
        info!(
            port = self.config.port,
            tick_ms = self.config.tick.as_millis() as u64,
            restart_after_secs = self.config.restart_after.as_secs(),
            "relay loop running"
        );

        let cause = loop {
            if let Some(cause) = self.shutdown.cause() {
                break cause;
            }

            if started.elapsed() >= self.config.restart_after {
                info!(
                    uptime_secs = started.elapsed().as_secs(),
                    "restart budget reached"
                );
                self.shutdown.trigger(ShutdownCause::RestartBudget);
                continue;
            }

            match wait_ready(
                &self.listener,
                &self.registry,
                &self.shutdown,
                self.config.tick,
            )
            .await
            {
                Readiness::Shutdown => continue,
                Readiness::Accepted(stream, peer) => self.admit(stream, peer).await,
                Readiness::AcceptFailed(err) => warn!(error = %err, "accept failed"),
                Readiness::ClientReady | Readiness::TimedOut => {}
            }

            self.sweep_clients();
            self.drain_events().await;
        };

        self.close_all().await;
        info!(cause = %cause, "relay loop stopped");
        cause.outcome()
    }

    /// Upgrades a freshly accepted socket and registers it.
    ///
    /// Handshake failures are contained to this one client; the socket
    /// is dropped without ever entering the registry.
    async fn admit(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        match handshake::upgrade(&mut stream, peer).await {
            Ok(()) => {
                let id = self.registry.insert(stream, peer);
                info!(
                    conn = id,
                    peer = %peer,
                    clients = self.registry.len(),
                    "client connected"
                );
            }
            Err(err) => {
                warn!(peer = %peer, error = %err, "handshake failed");
            }
        }
    }

    /// Reads every ready client once, relaying valid messages and
    /// evicting closed or failed sockets.
    fn sweep_clients(&mut self) {
        for id in self.registry.ids() {
            let outcome = match self.registry.get_mut(id) {
                Some(conn) => conn.poll_message(),
                None => continue,
            };

            match outcome {
                ReadOutcome::Idle => {}
                ReadOutcome::Message(text) => self.relay(id, &text),
                ReadOutcome::BadPayload(err) => {
                    // Decode artifacts are dropped without feedback so
                    // they are never mistaken for protocol data.
                    trace!(conn = id, error = %err, "dropping undecodable frame");
                }
                ReadOutcome::Closed => self.evict(id, "peer closed"),
                ReadOutcome::Failed(err) => {
                    debug!(conn = id, error = %err, "read failed");
                    self.evict(id, "read error");
                }
            }
        }
    }

    /// Broadcasts one client message to every registered connection.
    fn relay(&mut self, from: ConnId, text: &str) {
        if let Some(conn) = self.registry.get(from) {
            info!(conn = from, peer = %conn.peer(), message = %text, "relaying client message");
        }

        let frame = frame::seal(text);
        let report = broadcast(&self.registry, &frame);
        if report.failed > 0 {
            debug!(
                attempted = report.attempted,
                failed = report.failed,
                "relay broadcast incomplete"
            );
        }
    }

    /// Removes a connection and closes its socket.
    fn evict(&mut self, id: ConnId, reason: &str) {
        if let Some(conn) = self.registry.remove(id) {
            info!(
                conn = id,
                peer = %conn.peer(),
                reason,
                clients = self.registry.len(),
                "client disconnected"
            );
            // Socket closed on drop; eviction is the only removal path.
        }
    }

    /// Polls the event source and broadcasts every unsent row.
    ///
    /// Rows are marked sent only after the whole batch was attempted;
    /// a failed mark-sent leaves them eligible for rebroadcast next
    /// tick (at-least-once).
    async fn drain_events(&mut self) {
        let records = match self.events.get_unsent().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "event source poll failed");
                return;
            }
        };
        if records.is_empty() {
            return;
        }

        let mut delivered = Vec::with_capacity(records.len());
        for record in records {
            info!(event = record.id, message = %record.message, "broadcasting event");
            let frame = frame::seal(&record.message);
            broadcast(&self.registry, &frame);
            delivered.push(record.id);
        }

        if let Err(err) = self.events.update_sent(&delivered).await {
            warn!(
                error = %err,
                events = delivered.len(),
                "mark-sent failed; events will be rebroadcast"
            );
        }
    }

    /// Closes every client socket, best effort, leaving the registry
    /// empty. The listener closes when the server is dropped.
    async fn close_all(&mut self) {
        let clients = self.registry.drain();
        let count = clients.len();
        for conn in clients {
            conn.close().await;
        }
        if count > 0 {
            info!(clients = count, "closed all client connections");
        }
    }
}

/// Waits until the listener or any client socket is ready, the tick
/// timeout elapses, or shutdown is triggered.
async fn wait_ready(
    listener: &TcpListener,
    registry: &ConnectionRegistry,
    shutdown: &ShutdownSignal,
    timeout: Duration,
) -> Readiness {
    let any_client_ready = async {
        let readable: Vec<_> = registry
            .iter()
            .map(|conn| Box::pin(conn.readable()))
            .collect();
        if readable.is_empty() {
            std::future::pending::<()>().await;
        } else {
            // Which socket woke us does not matter; the sweep scans
            // every client with a non-blocking read anyway.
            let _ = futures_util::future::select_all(readable).await;
        }
    };

    tokio::select! {
        _ = shutdown.cancelled() => Readiness::Shutdown,
        result = listener.accept() => match result {
            Ok((stream, peer)) => Readiness::Accepted(stream, peer),
            Err(err) => Readiness::AcceptFailed(err),
        },
        _ = any_client_ready => Readiness::ClientReady,
        _ = tokio::time::sleep(timeout) => Readiness::TimedOut,
    }
}

/// Errors that are fatal at server startup.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be created; nothing is
    /// recoverable, so no restart is attempted
    #[error("failed to bind 0.0.0.0:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("listener address unavailable: {0}")]
    Addr(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::MemoryEventSource;

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let events: Arc<dyn EventSource> = Arc::new(MemoryEventSource::new());
        let shutdown = ShutdownSignal::new();

        let first = RelayServer::bind(RelayConfig::for_port(0), events.clone(), shutdown.clone())
            .await
            .unwrap();
        let taken_port = first.local_addr().unwrap().port();

        let err = RelayServer::bind(RelayConfig::for_port(taken_port), events, shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Bind { port, .. } if port == taken_port));
    }

    #[tokio::test]
    async fn test_local_addr_resolves_ephemeral_port() {
        let events: Arc<dyn EventSource> = Arc::new(MemoryEventSource::new());
        let server = RelayServer::bind(RelayConfig::for_port(0), events, ShutdownSignal::new())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_pre_triggered_shutdown_stops_immediately() {
        let events: Arc<dyn EventSource> = Arc::new(MemoryEventSource::new());
        let shutdown = ShutdownSignal::new();
        shutdown.trigger(ShutdownCause::Interrupt);

        let server = RelayServer::bind(RelayConfig::for_port(0), events, shutdown)
            .await
            .unwrap();
        assert_eq!(server.run().await, Outcome::Exit);
    }
}
