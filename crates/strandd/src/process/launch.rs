//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use strand_rpc::{RpcServer, ServerOptions};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::methods::builtin_router;

use super::errors::LaunchError;
use super::shutdown::{ShutdownCause, ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, SHUTDOWN_TIMEOUT, SIGNAL_POLL_INTERVAL};

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when any launch stage fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let reporter = StructuredHealthReporter::new();
    let shutdown = SystemShutdownSignal::new(SIGNAL_POLL_INTERVAL);
    run_daemon_with(&SystemConfigLoader, &reporter, &shutdown, SHUTDOWN_TIMEOUT)
}

/// Runs the daemon with injected collaborators.
///
/// Binds the configured endpoint, serves the built-in methods until
/// `shutdown` returns and then waits up to `shutdown_timeout` for every
/// session to finish.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, binding or signal installation
/// fails, when the server stops without being asked to, or when workers
/// outlive the shutdown budget.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    shutdown: &dyn ShutdownSignal,
    shutdown_timeout: Duration,
) -> Result<(), LaunchError> {
    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(loader, reporter)?;
    let config = daemon.config();
    let server = RpcServer::bind(
        config.listen_socket(),
        &ServerOptions::from_config(config),
        Arc::new(builtin_router()),
    )?;
    reporter.server_listening(server.endpoint());

    let cause = shutdown.wait(server.worker());
    reporter.shutdown_started();
    server.shutdown();
    if !server.worker().wait_timeout(shutdown_timeout) {
        warn!(
            target: PROCESS_TARGET,
            sessions = server.session_count(),
            timeout_ms = shutdown_timeout.as_millis(),
            "workers did not finish in time"
        );
        return Err(LaunchError::ShutdownTimedOut {
            timeout: shutdown_timeout,
        });
    }
    server.join()?;
    reporter.shutdown_completed();
    if cause? == ShutdownCause::ServerStopped {
        return Err(LaunchError::ServerStopped);
    }
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
