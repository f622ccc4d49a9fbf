//! Relay daemon configuration.

use std::time::Duration;

/// Default listening port (overridden by `--port` / `EVENT_PORT`).
pub const DEFAULT_PORT: u16 = 8081;

/// Default readiness-wait timeout; also the event-source poll interval.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Default uptime budget before a scheduled clean restart.
pub const DEFAULT_RESTART_AFTER: Duration = Duration::from_secs(10 * 60 * 60);

/// Runtime configuration for a [`RelayServer`](crate::RelayServer).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// TCP port to bind on all interfaces
    pub port: u16,

    /// Upper bound of one readiness wait; paces event-source polling
    pub tick: Duration,

    /// Elapsed uptime after which the loop shuts down with restart
    /// intent
    pub restart_after: Duration,
}

impl RelayConfig {
    /// Creates a configuration for `port` with default pacing.
    pub fn for_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick: DEFAULT_TICK,
            restart_after: DEFAULT_RESTART_AFTER,
        }
    }
}
