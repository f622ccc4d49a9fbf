//! Integration tests for relay shutdown and restart intent.
//!
//! The supervisor in the binary restarts the relay loop whenever
//! `run` returns [`Outcome::Restart`]; these tests verify which
//! shutdown causes produce which outcome and that every client socket
//! is closed on the way out.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{EventSource, MemoryEventSource};
use relay_protocol::{accept_token, upgrade_request};
use relayd::{Outcome, RelayConfig, RelayServer, ShutdownCause, ShutdownSignal};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Maximum time to wait for the relay task to finish
const RUN_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns a relay and returns its address, signal handle, and task.
async fn spawn_relay(
    config: RelayConfig,
) -> (
    std::net::SocketAddr,
    ShutdownSignal,
    tokio::task::JoinHandle<Outcome>,
) {
    let events: Arc<dyn EventSource> = Arc::new(MemoryEventSource::new());
    let shutdown = ShutdownSignal::new();

    let server = RelayServer::bind(config, events, shutdown.clone())
        .await
        .expect("bind test relay");
    let addr = server.local_addr().expect("resolve ephemeral port");
    let handle = tokio::spawn(server.run());

    (addr, shutdown, handle)
}

fn fast_config() -> RelayConfig {
    RelayConfig {
        port: 0,
        tick: Duration::from_millis(20),
        restart_after: Duration::from_secs(600),
    }
}

/// Connects and completes the upgrade handshake.
async fn connect_upgraded(addr: std::net::SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    stream
        .write_all(upgrade_request(&addr.to_string(), key).as_bytes())
        .await
        .expect("send upgrade request");

    let mut buf = vec![0u8; 1024];
    let n = timeout(RUN_TIMEOUT, stream.read(&mut buf))
        .await
        .expect("upgrade timed out")
        .expect("read upgrade response");
    let response = String::from_utf8_lossy(&buf[..n]);
    assert!(response.starts_with("HTTP/1.1 101"));
    assert!(response.contains(&accept_token(key)));

    stream
}

/// Reads until EOF, asserting the server closed the socket.
async fn expect_eof(mut stream: TcpStream) {
    let mut buf = [0u8; 1024];
    loop {
        let n = timeout(RUN_TIMEOUT, stream.read(&mut buf))
            .await
            .expect("timed out waiting for the server to close the socket")
            .expect("read");
        if n == 0 {
            return;
        }
    }
}

#[tokio::test]
async fn test_interrupt_means_permanent_exit() {
    let (_addr, shutdown, handle) = spawn_relay(fast_config()).await;

    shutdown.trigger(ShutdownCause::Interrupt);

    let outcome = timeout(RUN_TIMEOUT, handle)
        .await
        .expect("relay did not stop")
        .expect("relay task panicked");
    assert_eq!(outcome, Outcome::Exit);
}

#[tokio::test]
async fn test_terminate_requests_restart_and_closes_clients() {
    let (addr, shutdown, handle) = spawn_relay(fast_config()).await;
    let client = connect_upgraded(addr).await;

    shutdown.trigger(ShutdownCause::Terminate);

    let outcome = timeout(RUN_TIMEOUT, handle)
        .await
        .expect("relay did not stop")
        .expect("relay task panicked");
    assert_eq!(outcome, Outcome::Restart);

    expect_eof(client).await;
}

#[tokio::test]
async fn test_hangup_requests_restart() {
    let (_addr, shutdown, handle) = spawn_relay(fast_config()).await;

    shutdown.trigger(ShutdownCause::Hangup);

    let outcome = timeout(RUN_TIMEOUT, handle)
        .await
        .expect("relay did not stop")
        .expect("relay task panicked");
    assert_eq!(outcome, Outcome::Restart);
}

#[tokio::test]
async fn test_restart_budget_stops_the_loop_with_restart_intent() {
    let config = RelayConfig {
        port: 0,
        tick: Duration::from_millis(20),
        restart_after: Duration::from_millis(150),
    };
    let (addr, _shutdown, handle) = spawn_relay(config).await;
    let client = connect_upgraded(addr).await;

    let outcome = timeout(RUN_TIMEOUT, handle)
        .await
        .expect("budget never fired")
        .expect("relay task panicked");
    assert_eq!(outcome, Outcome::Restart);

    expect_eof(client).await;
}

#[tokio::test]
async fn test_first_cause_wins_over_later_signals() {
    let (_addr, shutdown, handle) = spawn_relay(fast_config()).await;

    shutdown.trigger(ShutdownCause::Interrupt);
    shutdown.trigger(ShutdownCause::Terminate);

    let outcome = timeout(RUN_TIMEOUT, handle)
        .await
        .expect("relay did not stop")
        .expect("relay task panicked");
    assert_eq!(outcome, Outcome::Exit);
}
