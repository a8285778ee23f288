//! Waiting for the daemon to be told, or forced, to stop.

use std::io;
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use strand_rpc::Worker;

use super::PROCESS_TARGET;

const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Why the daemon left its serving state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination request arrived; carries the signal number.
    Requested(i32),
    /// The accept worker finished before any request arrived.
    ServerStopped,
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown is requested or `server` finishes on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the notification source cannot be set up.
    fn wait(&self, server: &Worker) -> Result<ShutdownCause, ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for SIGTERM, SIGINT, SIGQUIT or SIGHUP while watching the server.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    poll_interval: Duration,
}

impl SystemShutdownSignal {
    /// Checks for signals and server exit every `poll_interval`.
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self, server: &Worker) -> Result<ShutdownCause, ShutdownError> {
        let mut signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        loop {
            if let Some(signal) = signals.pending().next() {
                info!(
                    target: PROCESS_TARGET,
                    signal,
                    "shutdown signal received"
                );
                return Ok(ShutdownCause::Requested(signal));
            }
            if server.is_finished() {
                warn!(
                    target: PROCESS_TARGET,
                    endpoint = %server.label(),
                    "rpc server stopped without a shutdown request"
                );
                return Ok(ShutdownCause::ServerStopped);
            }
            thread::sleep(self.poll_interval);
        }
    }
}
