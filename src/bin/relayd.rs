//! relayd - WebSocket broadcast relay daemon
//!
//! This binary runs as a long-lived daemon, accepting WebSocket
//! connections and relaying client messages plus queued application
//! events to every connected socket.
//!
//! # Usage
//!
//! ```bash
//! # Start the relay (foreground)
//! relayd start
//!
//! # Start the relay (background/daemonized)
//! relayd start -d
//!
//! # Stop the running relay permanently
//! relayd stop
//!
//! # Check relay status
//! relayd status
//!
//! # Start on a custom port
//! EVENT_PORT=9000 relayd start
//!
//! # Enable debug logging
//! RUST_LOG=relayd=debug relayd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGINT: permanent stop (also what `relayd stop` sends)
//! - SIGTERM/SIGHUP: close all sockets, then restart the relay loop
//!   in-process; the same happens when the 10 h uptime budget is spent

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_core::{EventSource, MemoryEventSource};
use relayd::config::DEFAULT_PORT;
use relayd::{spawn_signal_watcher, Outcome, RelayConfig, RelayServer, ShutdownSignal};

/// wsrelay daemon - WebSocket broadcast relay
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the relay
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Listening port (falls back to EVENT_PORT, then 8081)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Stop the running relay permanently
    Stop,
    /// Show relay status
    Status,
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("relayd.pid")
}

/// Returns the path to the log file used when daemonized.
fn log_file_path() -> PathBuf {
    state_dir().join("relayd.log")
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("wsrelay")
}

/// Reads the PID and start time from the PID file, if present.
fn read_pid_record() -> Option<(u32, Option<DateTime<Utc>>)> {
    let mut contents = String::new();
    File::open(pid_file_path())
        .ok()?
        .read_to_string(&mut contents)
        .ok()?;

    let mut parts = contents.split_whitespace();
    let pid = parts.next()?.parse().ok()?;
    let started = parts.next().and_then(|s| s.parse().ok());
    Some((pid, started))
}

/// Writes the current PID and start time to the PID file.
fn write_pid_record() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{} {}", process::id(), Utc::now().to_rfc3339()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Checks if the relay is already running.
fn running_daemon() -> Option<(u32, Option<DateTime<Utc>>)> {
    if let Some((pid, started)) = read_pid_record() {
        if is_process_running(pid) {
            return Some((pid, started));
        }
        // Stale PID file - remove it
        remove_pid_file();
    }
    None
}

/// Sends SIGINT to the relay process.
///
/// SIGINT is the permanent-stop signal; SIGTERM would make the daemon
/// restart itself.
fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGINT) };
        if result != 0 {
            bail!("Failed to send SIGINT to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        port: None,
    });

    match command {
        Command::Start { daemon, port } => {
            if let Some((pid, _)) = running_daemon() {
                eprintln!("Relay is already running (PID {pid})");
                eprintln!("Use 'relayd stop' to stop it first.");
                process::exit(1);
            }

            let port = resolve_port(port);

            if daemon {
                daemonize()?;
            }

            write_pid_record()?;

            let result = run_daemon(port);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some((pid, _)) = running_daemon() {
                println!("Stopping relay (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Relay stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Relay did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Relay is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some((pid, started)) = running_daemon() {
                println!("Relay is running (PID {pid})");
                println!("Port: {}", resolve_port(None));
                if let Some(started) = started {
                    let uptime = Utc::now().signed_duration_since(started);
                    println!("Started: {} (up {} minutes)", started, uptime.num_minutes());
                }
                Ok(())
            } else {
                println!("Relay is not running.");
                process::exit(1);
            }
        }
    }
}

/// Port resolution order: CLI flag, `EVENT_PORT`, built-in default.
fn resolve_port(flag: Option<u16>) -> u16 {
    flag.or_else(|| env::var("EVENT_PORT").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(DEFAULT_PORT)
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

/// Runs the relay with its supervisor loop (async entry point).
#[tokio::main]
async fn run_daemon(port: u16) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_core=info".parse()?)
                .add_directive("relay_protocol=info".parse()?)
                .add_directive("wsrelay=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        port,
        "relay daemon starting"
    );

    // The event queue survives restarts of the relay loop, so rows
    // queued during a scheduled restart are broadcast afterwards.
    let events: Arc<dyn EventSource> = Arc::new(MemoryEventSource::new());

    loop {
        let shutdown = ShutdownSignal::new();
        let watcher = spawn_signal_watcher(shutdown.clone());

        let server = RelayServer::bind(RelayConfig::for_port(port), events.clone(), shutdown)
            .await
            .context("Failed to bind listening socket")?;

        let outcome = server.run().await;
        watcher.abort();

        match outcome {
            Outcome::Restart => {
                info!("restarting relay loop");
            }
            Outcome::Exit => {
                info!("relay daemon stopped");
                break;
            }
        }
    }

    Ok(())
}
