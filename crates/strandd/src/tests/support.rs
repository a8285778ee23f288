//! Collaborators injected into the daemon under test.

use std::ffi::OsString;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ortho_config::{OrthoConfig, OrthoError};
use serde_json::Value;

use strand_config::{Config, SocketEndpoint};
use strand_rpc::{ClientOptions, MethodRouter, RpcClient, Worker};

use crate::SESSION_STARTED;
use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;
use crate::process::{ShutdownCause, ShutdownError, ShutdownSignal};

/// Upper bound on any single wait in the suites.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Configuration that binds an ephemeral loopback port and stays quiet.
pub fn test_config() -> Config {
    Config {
        listen_socket: SocketEndpoint::tcp("127.0.0.1", 0),
        poll_interval_ms: 10,
        request_timeout_ms: 5_000,
        log_filter: "off".to_owned(),
        ..Config::default()
    }
}

/// Loader that intentionally fails by passing an unparsable flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(vec![
            OsString::from("strandd"),
            OsString::from("--poll-interval-ms"),
            OsString::from("soon"),
        ])
    }
}

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ServerListening(SocketEndpoint),
    ShutdownStarted,
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Waits until the daemon reports the endpoint it is listening on.
    pub fn wait_for_listening(&self) -> SocketEndpoint {
        let deadline = Instant::now() + PATIENCE;
        while Instant::now() < deadline {
            let listening = self.events().into_iter().find_map(|event| match event {
                HealthEvent::ServerListening(endpoint) => Some(endpoint),
                _ => None,
            });
            if let Some(endpoint) = listening {
                return endpoint;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("daemon never reported a listening endpoint");
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn server_listening(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::ServerListening(endpoint.clone()));
    }

    fn shutdown_started(&self) {
        self.record(HealthEvent::ShutdownStarted);
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

/// Shutdown signal released by the test instead of the operating system.
#[derive(Clone, Default)]
pub struct TestShutdownSignal {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, condvar) = &*self.state;
        *flag.lock().expect("shutdown flag mutex poisoned") = true;
        condvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self, server: &Worker) -> Result<ShutdownCause, ShutdownError> {
        let (flag, condvar) = &*self.state;
        let mut triggered = flag.lock().expect("shutdown flag mutex poisoned");
        while !*triggered {
            if server.is_finished() {
                return Ok(ShutdownCause::ServerStopped);
            }
            triggered = condvar
                .wait_timeout(triggered, Duration::from_millis(10))
                .expect("shutdown flag mutex poisoned")
                .0;
        }
        Ok(ShutdownCause::Requested(0))
    }
}

/// Signal that reports the server as already stopped, as if its accept
/// worker had died.
pub struct ServerAlreadyStopped;

impl ShutdownSignal for ServerAlreadyStopped {
    fn wait(&self, _server: &Worker) -> Result<ShutdownCause, ShutdownError> {
        Ok(ShutdownCause::ServerStopped)
    }
}

/// Connects a client that forwards `session/started` notifications.
pub fn connect_client(endpoint: &SocketEndpoint) -> (RpcClient, Receiver<Value>) {
    let (sender, started) = mpsc::channel();
    let sender = Mutex::new(sender);
    let router = MethodRouter::new().notification(SESSION_STARTED, move |_, params| {
        drop(sender.lock().expect("notification sender").send(params));
        Ok(())
    });
    let options = ClientOptions {
        request_timeout: Some(PATIENCE),
        connect_timeout: PATIENCE,
        ..ClientOptions::default()
    };
    let client =
        RpcClient::connect(endpoint, &options, Arc::new(router)).expect("connect client");
    (client, started)
}
