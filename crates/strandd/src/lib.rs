//! The strand RPC daemon.
//!
//! `strandd` loads layered configuration, installs structured telemetry,
//! binds an [`RpcServer`](strand_rpc::RpcServer) on the configured endpoint
//! and serves the built-in methods until a termination signal arrives. Each
//! lifecycle stage is reported through a [`HealthReporter`] so operators can
//! follow start-up and shutdown in the logs.

mod bootstrap;
mod health;
mod methods;
mod process;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use methods::{SESSION_STARTED, builtin_router};
pub use process::{
    LaunchError, ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon,
    run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
