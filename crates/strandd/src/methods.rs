//! Methods served by every daemon session.

use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};

use strand_rpc::{HandlerError, MethodRouter, RpcPeer};

const METHODS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::methods");

/// Notification sent to every client as soon as its session starts.
pub const SESSION_STARTED: &str = "session/started";

/// Longest pause `sleep` accepts, in milliseconds.
const MAX_SLEEP_MS: u64 = 60_000;

/// Builds the router with the daemon's built-in methods.
///
/// | Method | Kind | Behaviour |
/// | ------ | ---- | --------- |
/// | `echo` | request | returns its params unchanged |
/// | `ping` | request | returns `"pong"` |
/// | `sleep` | request | `[millis]`: pauses, then returns `null` |
/// | `fail` | request | `[message, code?]`: answers with that error |
/// | `log` | notification | writes its params to the daemon log |
#[must_use]
pub fn builtin_router() -> MethodRouter {
    MethodRouter::new()
        .request("echo", |_, params| Ok(params))
        .request("ping", |_, _| Ok(Value::from("pong")))
        .request("sleep", sleep)
        .request("fail", fail)
        .notification("log", |peer, params| {
            info!(
                target: METHODS_TARGET,
                peer = %peer.label(),
                params = %params,
                "client log"
            );
            Ok(())
        })
        .with_connect_hook(announce_session)
}

fn sleep(_: &RpcPeer, params: Value) -> Result<Value, HandlerError> {
    let (millis,): (u64,) = serde_json::from_value(params)?;
    if millis > MAX_SLEEP_MS {
        return Err(HandlerError::invalid_params(format!(
            "sleep is limited to {MAX_SLEEP_MS} ms"
        )));
    }
    thread::sleep(Duration::from_millis(millis));
    Ok(Value::Null)
}

fn fail(_: &RpcPeer, params: Value) -> Result<Value, HandlerError> {
    let (message, code): (String, Option<i64>) = match params {
        Value::Array(mut items) if items.len() == 1 => {
            (serde_json::from_value(items.remove(0))?, None)
        }
        other => serde_json::from_value(other)?,
    };
    Err(match code {
        Some(code) => HandlerError::with_code(code, message),
        None => HandlerError::new(message),
    })
}

fn announce_session(peer: &RpcPeer) {
    if let Err(error) = peer.notify(SESSION_STARTED, json!([peer.label()])) {
        warn!(
            target: METHODS_TARGET,
            peer = %peer.label(),
            error = %error,
            "failed to announce session"
        );
    }
}
