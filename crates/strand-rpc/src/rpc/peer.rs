//! The sending half of an RPC session and its correlation table.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use super::CLIENT_TARGET;
use super::error::RpcError;
use super::handler::RpcHandler;
use super::message::{RpcErrorObject, notification_frame, request_frame, response_frame};
use super::pending::{PendingCalls, WaitOutcome};
use crate::codec::ValueWriter;

/// How [`RpcPeer::request_with`] treats the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Whether to register the call and block for its response.
    pub wait: bool,
    /// Bound on the wait; `None` waits until a response or close.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Waits for the response for at most `timeout`.
    #[must_use]
    pub const fn waiting(timeout: Option<Duration>) -> Self {
        Self {
            wait: true,
            timeout,
        }
    }

    /// Sends the request without registering it; any response is unsolicited.
    #[must_use]
    pub const fn detached() -> Self {
        Self {
            wait: false,
            timeout: None,
        }
    }
}

/// Outcome of [`RpcPeer::request_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Id allocated to the request.
    pub id: i64,
    /// Result payload; `None` when the caller did not wait.
    pub result: Option<Value>,
}

struct SendState {
    next_id: i64,
    writer: Box<dyn ValueWriter>,
    closed: bool,
}

struct PeerShared {
    label: String,
    send: Mutex<SendState>,
    pending: PendingCalls,
    handler: Arc<dyn RpcHandler>,
    default_timeout: Option<Duration>,
}

/// Handle for talking to the remote end of one connection.
///
/// Cloned handles share the connection. Writes are serialised by a single
/// send lock, which also guards request-id allocation, so ids are unique and
/// strictly increasing per connection.
#[derive(Clone)]
pub struct RpcPeer {
    shared: Arc<PeerShared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RpcPeer {
    pub(crate) fn new(
        label: String,
        writer: Box<dyn ValueWriter>,
        handler: Arc<dyn RpcHandler>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            shared: Arc::new(PeerShared {
                label,
                send: Mutex::new(SendState {
                    next_id: 0,
                    writer,
                    closed: false,
                }),
                pending: PendingCalls::default(),
                handler,
                default_timeout,
            }),
        }
    }

    /// Describes the remote end.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Returns `true` once the connection's read loop has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.shared.send).closed
    }

    /// Sends a request and, when `options.wait` is set, blocks for its
    /// response.
    ///
    /// The id is allocated and the pending entry registered under the send
    /// lock before the frame is written, so a fast response always finds
    /// its entry.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Remote`] when the peer answers with an error,
    /// [`RpcError::Timeout`] when the wait expires,
    /// [`RpcError::ConnectionClosed`] when the connection ends first, and
    /// [`RpcError::Send`] when the frame cannot be written.
    pub fn request_with(
        &self,
        method: &str,
        params: Value,
        options: RequestOptions,
    ) -> Result<Reply, RpcError> {
        let mut send = lock(&self.shared.send);
        if send.closed {
            return Err(RpcError::ConnectionClosed);
        }
        send.next_id += 1;
        let id = send.next_id;
        let call = options.wait.then(|| self.shared.pending.register(id));
        let written = send.writer.write_value(&request_frame(id, method, params));
        drop(send);

        if let Err(error) = written {
            if let Some(call) = call {
                self.shared.pending.discard(call);
            }
            return Err(RpcError::Send(error));
        }
        trace!(
            target: CLIENT_TARGET,
            peer = %self.shared.label,
            id,
            method,
            "request sent"
        );

        let Some(call) = call else {
            return Ok(Reply { id, result: None });
        };
        match self.shared.pending.wait(call, options.timeout) {
            WaitOutcome::Resolved(response) => match response.outcome {
                Ok(result) => Ok(Reply {
                    id,
                    result: Some(result),
                }),
                Err(error) => Err(RpcError::Remote { id, error }),
            },
            WaitOutcome::TimedOut => {
                debug!(
                    target: CLIENT_TARGET,
                    peer = %self.shared.label,
                    id,
                    method,
                    "request timed out"
                );
                Err(RpcError::Timeout {
                    id,
                    timeout: options.timeout.unwrap_or_default(),
                })
            }
            WaitOutcome::Closed => Err(RpcError::ConnectionClosed),
        }
    }

    /// Sends a request and waits up to the connection's default timeout.
    ///
    /// # Errors
    ///
    /// As for [`RpcPeer::request_with`].
    pub fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.request_timeout(method, params, self.shared.default_timeout)
    }

    /// Sends a request and waits up to `timeout`; `None` waits without bound.
    ///
    /// # Errors
    ///
    /// As for [`RpcPeer::request_with`].
    pub fn request_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let reply = self.request_with(method, params, RequestOptions::waiting(timeout))?;
        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Sends a request without waiting and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ConnectionClosed`] or [`RpcError::Send`].
    pub fn request_detached(&self, method: &str, params: Value) -> Result<i64, RpcError> {
        self.request_with(method, params, RequestOptions::detached())
            .map(|reply| reply.id)
    }

    /// Typed wrapper around [`RpcPeer::request`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Encode`] or [`RpcError::Decode`] when the payloads
    /// do not convert, otherwise as for [`RpcPeer::request_with`].
    pub fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(RpcError::Encode)?;
        let result = self.request(method, params)?;
        serde_json::from_value(result).map_err(RpcError::Decode)
    }

    /// Sends a notification. Never registers a pending call or waits.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ConnectionClosed`] or [`RpcError::Send`].
    pub fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        let mut send = lock(&self.shared.send);
        if send.closed {
            return Err(RpcError::ConnectionClosed);
        }
        send.writer
            .write_value(&notification_frame(method, params))
            .map_err(RpcError::Send)
    }

    /// Answers request `id` with a result or an error object.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ConnectionClosed`] or [`RpcError::Send`].
    pub fn respond(
        &self,
        id: &Value,
        outcome: Result<Value, RpcErrorObject>,
    ) -> Result<(), RpcError> {
        let frame = response_frame(id, outcome);
        let mut send = lock(&self.shared.send);
        if send.closed {
            return Err(RpcError::ConnectionClosed);
        }
        send.writer.write_value(&frame).map_err(RpcError::Send)
    }

    pub(crate) fn handler(&self) -> &dyn RpcHandler {
        self.shared.handler.as_ref()
    }

    pub(crate) fn pending(&self) -> &PendingCalls {
        &self.shared.pending
    }

    /// Refuses further sends and fails every waiting call.
    pub(crate) fn mark_closed(&self) {
        let mut send = lock(&self.shared.send);
        let already = std::mem::replace(&mut send.closed, true);
        drop(send);
        if !already {
            debug!(
                target: CLIENT_TARGET,
                peer = %self.shared.label,
                "connection closed"
            );
        }
        self.shared.pending.close_all();
    }
}

impl fmt::Debug for RpcPeer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RpcPeer")
            .field("label", &self.shared.label)
            .field("pending", &self.shared.pending.len())
            .finish_non_exhaustive()
    }
}
