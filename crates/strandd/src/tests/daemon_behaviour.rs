//! Behavioural tests covering the daemon launch and shutdown sequence.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use strand_rpc::{RpcClient, RpcError};

use crate::bootstrap::{ConfigLoader, StaticConfigLoader};
use crate::process::{LaunchError, run_daemon_with};

use super::support::{
    FailingConfigLoader, HealthEvent, PATIENCE, RecordingHealthReporter, TestShutdownSignal,
    connect_client, test_config,
};

struct DaemonWorld {
    reporter: Arc<RecordingHealthReporter>,
    shutdown: TestShutdownSignal,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
    client: Option<(RpcClient, Receiver<Value>)>,
}

impl DaemonWorld {
    fn new() -> Self {
        Self {
            reporter: Arc::new(RecordingHealthReporter::default()),
            shutdown: TestShutdownSignal::new(),
            handle: None,
            result: None,
            client: None,
        }
    }

    fn start(&mut self, loader: Box<dyn ConfigLoader>) {
        let reporter = Arc::clone(&self.reporter);
        let shutdown = self.shutdown.clone();
        self.handle = Some(thread::spawn(move || {
            run_daemon_with(&*loader, &reporter, &shutdown, PATIENCE)
        }));
    }

    fn finish(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.result = Some(handle.join().expect("daemon thread panicked"));
        }
    }

    fn client(&self) -> &RpcClient {
        &self.client.as_ref().expect("a client should be connected").0
    }

    fn result(&self) -> &Result<(), LaunchError> {
        self.result.as_ref().expect("the daemon run should have finished")
    }
}

impl Drop for DaemonWorld {
    fn drop(&mut self) {
        if let Some((client, _)) = self.client.take() {
            client.shutdown();
            drop(client.join());
        }
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            drop(handle.join());
        }
    }
}

#[fixture]
fn world() -> RefCell<DaemonWorld> {
    RefCell::new(DaemonWorld::new())
}

#[given("a daemon with an invalid configuration")]
fn given_invalid_configuration(world: &RefCell<DaemonWorld>) {
    world.borrow_mut().start(Box::new(FailingConfigLoader));
}

#[given("a running daemon")]
fn given_running_daemon(world: &RefCell<DaemonWorld>) {
    world
        .borrow_mut()
        .start(Box::new(StaticConfigLoader::new(test_config())));
}

#[given("a connected client")]
fn given_connected_client(world: &RefCell<DaemonWorld>) {
    let endpoint = world.borrow().reporter.wait_for_listening();
    world.borrow_mut().client = Some(connect_client(&endpoint));
}

#[when("the daemon runs to completion")]
fn when_daemon_completes(world: &RefCell<DaemonWorld>) {
    world.borrow_mut().finish();
}

#[when("shutdown is triggered")]
fn when_shutdown_triggered(world: &RefCell<DaemonWorld>) {
    world.borrow().shutdown.trigger();
}

#[then("the launch fails during bootstrap")]
fn then_launch_fails(world: &RefCell<DaemonWorld>) {
    let world = world.borrow();
    match world.result() {
        Err(LaunchError::Bootstrap { .. }) => {}
        other => panic!("expected a bootstrap failure, got {other:?}"),
    }
}

#[then("the health log records a failed bootstrap")]
fn then_failed_bootstrap(world: &RefCell<DaemonWorld>) {
    let events = world.borrow().reporter.events();
    assert!(matches!(
        events.as_slice(),
        [HealthEvent::BootstrapStarting, HealthEvent::BootstrapFailed(_)]
    ));
}

#[then("the client is told its session started")]
fn then_session_started(world: &RefCell<DaemonWorld>) {
    let world = world.borrow();
    let (_, started) = world.client.as_ref().expect("a client should be connected");
    let params = started
        .recv_timeout(PATIENCE)
        .expect("session started notification");
    let label = params
        .get(0)
        .and_then(Value::as_str)
        .expect("notification carries the peer label");
    assert!(label.starts_with("tcp://127.0.0.1:"), "unexpected label {label}");
}

#[then("ping answers \"{answer}\"")]
fn then_ping_answers(world: &RefCell<DaemonWorld>, answer: String) {
    let result = world
        .borrow()
        .client()
        .peer()
        .request("ping", Value::Null)
        .expect("ping should succeed");
    assert_eq!(result, json!(answer));
}

#[then(
    "fail with \"{message}\" and code {code} is reported as \"{expected}\" with code {expected_code}"
)]
fn then_fail_reports(
    world: &RefCell<DaemonWorld>,
    message: String,
    code: i64,
    expected: String,
    expected_code: i64,
) {
    let error = world
        .borrow()
        .client()
        .peer()
        .request("fail", json!([message, code]))
        .expect_err("fail should report an error");
    let remote = error.remote().expect("a remote error");
    assert_eq!(remote.message, expected);
    assert_eq!(remote.code, expected_code);
}

#[then("sleep for {millis} milliseconds is rejected with code {code}")]
fn then_sleep_rejected(world: &RefCell<DaemonWorld>, millis: u64, code: i64) {
    let error = world
        .borrow()
        .client()
        .peer()
        .request("sleep", json!([millis]))
        .expect_err("oversized sleep should be rejected");
    assert_eq!(error.remote().map(|remote| remote.code), Some(code));
}

#[then("the daemon run succeeds")]
fn then_daemon_succeeds(world: &RefCell<DaemonWorld>) {
    world.borrow_mut().finish();
    let world = world.borrow();
    let result = world.result();
    assert!(result.is_ok(), "daemon run should succeed: {result:?}");
}

#[then("the client connection is closed")]
fn then_client_closed(world: &RefCell<DaemonWorld>) {
    let world = world.borrow();
    let client = world.client();
    assert!(client.worker().wait_timeout(PATIENCE), "client should stop");
    assert!(matches!(
        client.peer().request("ping", Value::Null),
        Err(RpcError::ConnectionClosed)
    ));
}

#[then("the health log ends with a completed shutdown")]
fn then_shutdown_completed(world: &RefCell<DaemonWorld>) {
    let events = world.borrow().reporter.events();
    assert_eq!(
        events.get(events.len().saturating_sub(2)..),
        Some(&[HealthEvent::ShutdownStarted, HealthEvent::ShutdownCompleted][..])
    );
}

#[scenario(
    path = "tests/features/daemon_lifecycle.feature",
    name = "Configuration failure stops the launch"
)]
fn configuration_failure_stops_the_launch(world: RefCell<DaemonWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/daemon_lifecycle.feature",
    name = "Built-in methods answer a client"
)]
fn builtin_methods_answer_a_client(world: RefCell<DaemonWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/daemon_lifecycle.feature",
    name = "A shutdown signal stops every session"
)]
fn shutdown_signal_stops_every_session(world: RefCell<DaemonWorld>) {
    drop(world);
}
