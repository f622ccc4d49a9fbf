//! Shutdown causes, signal handling, and the supervisor outcome.
//!
//! The relay shuts down exactly once, from one of four causes. An
//! operator SIGINT is a permanent stop; everything else (SIGTERM,
//! SIGHUP, the uptime budget) asks the supervisor loop in the binary
//! to start a fresh relay, which keeps the process self-healing and
//! gives it a periodic clean restart.

use std::sync::Arc;
use std::sync::OnceLock;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Why the relay loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// SIGINT: operator-initiated permanent stop
    Interrupt,

    /// SIGTERM: external stop request, restart afterwards
    Terminate,

    /// SIGHUP: lost controlling terminal or reload request
    Hangup,

    /// Uptime reached the configured restart budget
    RestartBudget,
}

impl ShutdownCause {
    /// What the supervisor should do after the loop stops.
    pub fn outcome(self) -> Outcome {
        match self {
            Self::Interrupt => Outcome::Exit,
            Self::Terminate | Self::Hangup | Self::RestartBudget => Outcome::Restart,
        }
    }
}

impl std::fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Hangup => write!(f, "SIGHUP"),
            Self::RestartBudget => write!(f, "restart budget reached"),
        }
    }
}

/// Supervisor decision after one relay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit the process cleanly
    Exit,

    /// Start a fresh relay loop in the same process
    Restart,
}

/// One-shot shutdown trigger shared between the signal watcher, the
/// relay loop, and tests.
///
/// The first `trigger` wins; later causes are ignored, so the loop
/// enters its shutdown state exactly once.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    cause: Arc<OnceLock<ShutdownCause>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `cause` and cancels waiters. Idempotent.
    pub fn trigger(&self, cause: ShutdownCause) {
        if self.cause.set(cause).is_ok() {
            self.token.cancel();
        }
    }

    /// Resolves once the signal has been triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// True once triggered.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded cause, if triggered.
    pub fn cause(&self) -> Option<ShutdownCause> {
        self.cause.get().copied()
    }
}

/// Spawns the watcher that maps process signals onto `shutdown`.
///
/// Registers SIGTERM, SIGINT, and SIGHUP; the first one received
/// triggers the shutdown signal and the task exits.
pub fn spawn_signal_watcher(shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cause = wait_for_signal().await;
        info!(cause = %cause, "shutdown signal received");
        shutdown.trigger(cause);
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownCause {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint, mut sighup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
        _ => {
            error!("failed to register signal handlers");
            std::future::pending::<()>().await;
            return ShutdownCause::Interrupt;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => ShutdownCause::Terminate,
        _ = sigint.recv() => ShutdownCause::Interrupt,
        _ = sighup.recv() => ShutdownCause::Hangup,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownCause {
    match tokio::signal::ctrl_c().await {
        Ok(()) => ShutdownCause::Interrupt,
        Err(err) => {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
            ShutdownCause::Interrupt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_to_outcome() {
        assert_eq!(ShutdownCause::Interrupt.outcome(), Outcome::Exit);
        assert_eq!(ShutdownCause::Terminate.outcome(), Outcome::Restart);
        assert_eq!(ShutdownCause::Hangup.outcome(), Outcome::Restart);
        assert_eq!(ShutdownCause::RestartBudget.outcome(), Outcome::Restart);
    }

    #[test]
    fn test_first_trigger_wins() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        assert_eq!(signal.cause(), None);

        signal.trigger(ShutdownCause::Terminate);
        signal.trigger(ShutdownCause::Interrupt);

        assert!(signal.is_triggered());
        assert_eq!(signal.cause(), Some(ShutdownCause::Terminate));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            waiter.cause()
        });

        signal.trigger(ShutdownCause::RestartBudget);
        assert_eq!(handle.await.unwrap(), Some(ShutdownCause::RestartBudget));
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();

        clone.trigger(ShutdownCause::Hangup);
        assert!(signal.is_triggered());
        assert_eq!(signal.cause(), Some(ShutdownCause::Hangup));
    }
}
