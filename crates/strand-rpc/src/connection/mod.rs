//! Read loops that fan each produced value out to its own worker.

mod listener;

use std::error::Error as StdError;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::worker::{ThreadRelay, Worker, WorkerBuilder, WorkerContext, WorkerError};

pub use self::listener::{ListenerConnection, ListenerSource};

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Produces a lazy, non-restartable sequence of values from one resource.
pub trait ReadLoop: Send + 'static {
    /// Value handed to the dispatcher.
    type Value: Send + 'static;
    /// Error that ends the sequence.
    type Error: StdError + Send + 'static;

    /// Blocks until the next value is available.
    ///
    /// Returns `Ok(None)` once the resource is exhausted or shutdown has been
    /// requested. Implementations must notice `worker.is_shutdown_requested()`
    /// within a bounded time.
    ///
    /// # Errors
    ///
    /// Returns an error when the resource fails; the loop is not retried.
    fn next_value(&mut self, worker: &WorkerContext) -> Result<Option<Self::Value>, Self::Error>;
}

/// Strategy that processes one value on its own worker.
pub trait Dispatcher<V>: Send + Sync + 'static {
    /// Processes `value`. Runs on a dedicated [`ThreadRelay`] worker.
    fn dispatch(&self, worker: &WorkerContext, value: V);
}

impl<V, F> Dispatcher<V> for F
where
    F: Fn(&WorkerContext, V) + Send + Sync + 'static,
{
    fn dispatch(&self, worker: &WorkerContext, value: V) {
        self(worker, value);
    }
}

/// Pairs a [`ReadLoop`] with the [`Dispatcher`] that receives its values.
///
/// Reads happen in order on the connection's own worker; each value is then
/// dispatched on a fresh child worker, so the effects of different values are
/// not ordered relative to each other.
pub struct Connection<S, D: ?Sized> {
    source: S,
    dispatcher: Arc<D>,
}

impl<S, D> Connection<S, D>
where
    S: ReadLoop,
    D: Dispatcher<S::Value> + ?Sized,
{
    /// Creates a connection over `source`.
    pub fn new(source: S, dispatcher: Arc<D>) -> Self {
        Self { source, dispatcher }
    }

    /// Starts the read loop on a new worker described by `builder`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the worker thread cannot start.
    pub fn spawn(self, builder: WorkerBuilder<'_>) -> Result<Worker, WorkerError> {
        builder.spawn(move |worker| self.run(worker))
    }

    /// Runs the read loop on the current worker until the source ends.
    pub fn run(mut self, worker: &WorkerContext) {
        loop {
            match self.source.next_value(worker) {
                Ok(Some(value)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    if let Err(error) = ThreadRelay::spawn(worker, value, dispatcher) {
                        warn!(
                            target: CONNECTION_TARGET,
                            label = %worker.label(),
                            error = %error,
                            "failed to dispatch value"
                        );
                        break;
                    }
                }
                Ok(None) => {
                    debug!(
                        target: CONNECTION_TARGET,
                        label = %worker.label(),
                        "read loop finished"
                    );
                    break;
                }
                Err(error) => {
                    if worker.is_shutdown_requested() {
                        debug!(
                            target: CONNECTION_TARGET,
                            label = %worker.label(),
                            error = %error,
                            "read loop ended during shutdown"
                        );
                    } else {
                        warn!(
                            target: CONNECTION_TARGET,
                            label = %worker.label(),
                            error = %error,
                            "read loop failed"
                        );
                    }
                    break;
                }
            }
        }
    }
}
