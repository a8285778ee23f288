//! The read side of an RPC session: decoding, classification and dispatch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use strand_config::WireFraming;
use tracing::{debug, trace, warn};

use super::CLIENT_TARGET;
use super::error::{ClientError, HandlerError};
use super::handler::RpcHandler;
use super::message::InboundMessage;
use super::peer::RpcPeer;
use super::pending::Delivery;
use crate::codec::{CodecError, ValueReader, ValueWriter, value_reader, value_writer};
use crate::connection::{Connection, Dispatcher, ReadLoop};
use crate::transport::ConnectionStream;
use crate::worker::{Worker, WorkerBuilder, WorkerContext};

/// Read loop over the decoded values of one connection.
pub(crate) struct RpcConnection {
    reader: Box<dyn ValueReader>,
}

impl ReadLoop for RpcConnection {
    type Value = Value;
    type Error = CodecError;

    fn next_value(&mut self, worker: &WorkerContext) -> Result<Option<Value>, CodecError> {
        if worker.is_shutdown_requested() {
            return Ok(None);
        }
        match self.reader.next_value() {
            Err(error) if error.is_disconnect() || worker.is_shutdown_requested() => {
                debug!(
                    target: CLIENT_TARGET,
                    label = %worker.label(),
                    error = %error,
                    "peer disconnected"
                );
                Ok(None)
            }
            other => other,
        }
    }
}

/// Routes each decoded value to the handler or the pending-call table.
struct InboundDispatcher {
    peer: RpcPeer,
}

impl Dispatcher<Value> for InboundDispatcher {
    fn dispatch(&self, worker: &WorkerContext, value: Value) {
        let peer = &self.peer;
        match InboundMessage::classify(value) {
            InboundMessage::Request { id, method, params } => {
                let outcome = guarded(|| peer.handler().handle_request(peer, &method, params))
                    .map_err(HandlerError::into_error_object);
                if let Err(error) = peer.respond(&id, outcome) {
                    debug!(
                        target: CLIENT_TARGET,
                        label = %worker.label(),
                        method = %method,
                        error = %error,
                        "failed to send response"
                    );
                }
            }
            InboundMessage::Notification { method, params } => {
                if let Err(error) =
                    guarded(|| peer.handler().handle_notification(peer, &method, params))
                {
                    warn!(
                        target: CLIENT_TARGET,
                        label = %worker.label(),
                        method = %method,
                        code = error.code,
                        error = %error,
                        "notification handler failed"
                    );
                }
            }
            InboundMessage::Response(response) => match peer.pending().deliver(response) {
                Delivery::Delivered => {
                    trace!(
                        target: CLIENT_TARGET,
                        label = %worker.label(),
                        "response delivered"
                    );
                }
                Delivery::Unsolicited(response) => {
                    peer.handler().on_unsolicited_response(peer, response);
                }
            },
            InboundMessage::Invalid { id, reason } => {
                warn!(
                    target: CLIENT_TARGET,
                    label = %worker.label(),
                    id = ?id,
                    reason,
                    "dropping invalid message"
                );
            }
        }
    }
}

/// Runs a handler, turning a panic into an internal error.
fn guarded<T>(handler: impl FnOnce() -> Result<T, HandlerError>) -> Result<T, HandlerError> {
    panic::catch_unwind(AssertUnwindSafe(handler))
        .unwrap_or_else(|payload| Err(HandlerError::internal(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("handler panicked"))
}

/// Closes the session when its read loop ends, including by unwinding.
struct SessionClosing {
    peer: RpcPeer,
    stream: Arc<ConnectionStream>,
}

impl Drop for SessionClosing {
    fn drop(&mut self) {
        self.peer.mark_closed();
        self.stream.close();
    }
}

/// Starts the dispatch loop for `stream` on the worker described by
/// `builder`, then runs `on_parent_side` with the new peer on the calling
/// thread.
///
/// Shutting the worker down closes the stream, which ends the read loop.
/// When the loop ends the peer is marked closed: waiting calls fail with
/// [`RpcError::ConnectionClosed`](super::RpcError::ConnectionClosed).
pub(crate) fn spawn_session<H, R>(
    builder: WorkerBuilder<'_>,
    stream: ConnectionStream,
    framing: WireFraming,
    default_timeout: Option<Duration>,
    handler: Arc<dyn RpcHandler>,
    on_parent_side: H,
) -> Result<(RpcPeer, Worker, R), ClientError>
where
    H: FnOnce(&RpcPeer) -> R,
{
    let read_half = stream.try_clone().map_err(ClientError::Stream)?;
    let write_half = stream.try_clone().map_err(ClientError::Stream)?;
    run_session(
        builder,
        stream,
        value_reader(read_half, framing),
        value_writer(write_half, framing),
        default_timeout,
        handler,
        on_parent_side,
    )
}

/// Spawns the session worker over an already framed reader and writer.
/// `stream` is kept only to close the connection.
fn run_session<H, R>(
    builder: WorkerBuilder<'_>,
    stream: ConnectionStream,
    reader: Box<dyn ValueReader>,
    writer: Box<dyn ValueWriter>,
    default_timeout: Option<Duration>,
    handler: Arc<dyn RpcHandler>,
    on_parent_side: H,
) -> Result<(RpcPeer, Worker, R), ClientError>
where
    H: FnOnce(&RpcPeer) -> R,
{
    let closer = Arc::new(stream);
    let peer = RpcPeer::new(closer.peer_label(), writer, handler, default_timeout);
    let source = RpcConnection { reader };

    let hook_closer = Arc::clone(&closer);
    let session_peer = peer.clone();
    let (worker, output) = builder
        .on_shutdown(move || hook_closer.close())
        .spawn_with_hook(
            move |context| {
                let dispatcher = Arc::new(InboundDispatcher {
                    peer: session_peer.clone(),
                });
                let _closing = SessionClosing {
                    peer: session_peer,
                    stream: closer,
                };
                Connection::new(source, dispatcher).run(context);
            },
            |_| on_parent_side(&peer),
        )?;
    Ok((peer, worker, output))
}
