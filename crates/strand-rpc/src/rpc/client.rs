//! Client side of an RPC connection.

use std::sync::Arc;
use std::time::Duration;

use strand_config::{Config, SocketEndpoint, WireFraming};

use super::error::ClientError;
use super::handler::RpcHandler;
use super::peer::RpcPeer;
use super::session::spawn_session;
use crate::transport::{ConnectionStream, connect};
use crate::worker::{Worker, WorkerError};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every session a client or server opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Framing of values on the wire.
    pub framing: WireFraming,
    /// Default bound for [`RpcPeer::request`]; `None` waits without bound.
    pub request_timeout: Option<Duration>,
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ClientOptions {
    /// Derives options from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            framing: config.framing(),
            request_timeout: config.request_timeout(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// A connection whose inbound traffic is dispatched on its own worker.
///
/// The worker reads and decodes values in order and hands each one to a
/// fresh dispatch worker, so requests sent through [`RpcClient::peer`] can
/// be answered while handlers for inbound requests are still running.
#[derive(Debug)]
pub struct RpcClient {
    peer: RpcPeer,
    worker: Worker,
}

impl RpcClient {
    /// Connects to `endpoint` and starts dispatching inbound traffic.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the connection or its worker cannot be
    /// established.
    pub fn connect(
        endpoint: &SocketEndpoint,
        options: &ClientOptions,
        handler: Arc<dyn RpcHandler>,
    ) -> Result<Self, ClientError> {
        let stream = connect(endpoint, options.connect_timeout)?;
        Self::from_stream(stream, options, handler)
    }

    /// Starts dispatching inbound traffic on an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the stream cannot be split or the worker
    /// cannot start.
    pub fn from_stream(
        stream: ConnectionStream,
        options: &ClientOptions,
        handler: Arc<dyn RpcHandler>,
    ) -> Result<Self, ClientError> {
        let builder = Worker::builder(stream.peer_label());
        let (peer, worker, ()) = spawn_session(
            builder,
            stream,
            options.framing,
            options.request_timeout,
            handler,
            |_| (),
        )?;
        Ok(Self { peer, worker })
    }

    /// Handle for sending requests and notifications.
    #[must_use]
    pub fn peer(&self) -> &RpcPeer {
        &self.peer
    }

    /// Worker running the dispatch loop.
    #[must_use]
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Closes the connection and requests shutdown of every dispatch worker.
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }

    /// Waits for the dispatch loop and all in-flight handlers to finish.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the dispatch worker panicked.
    pub fn join(&self) -> Result<(), WorkerError> {
        self.worker.join()
    }
}
