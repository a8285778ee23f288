//! Errors surfaced while launching or supervising the daemon.

use std::time::Duration;

use thiserror::Error;

use strand_rpc::{ServerError, WorkerError};

use crate::bootstrap::BootstrapError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The RPC server could not start.
    #[error("rpc server failed to start: {source}")]
    Server {
        /// Underlying server error.
        #[source]
        source: ServerError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// The accept worker ended before a shutdown was requested.
    #[error("rpc server stopped unexpectedly")]
    ServerStopped,
    /// Workers were still running when the shutdown budget ran out.
    #[error("workers still running after {timeout:?}")]
    ShutdownTimedOut {
        /// Budget that elapsed.
        timeout: Duration,
    },
    /// The server worker ended abnormally.
    #[error("rpc server worker failed: {source}")]
    Worker {
        /// Underlying worker error.
        #[source]
        source: WorkerError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ServerError> for LaunchError {
    fn from(source: ServerError) -> Self {
        Self::Server { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<WorkerError> for LaunchError {
    fn from(source: WorkerError) -> Self {
        Self::Worker { source }
    }
}
