//! Accepting side: one RPC session per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use strand_config::{Config, SocketEndpoint};
use tracing::{info, warn};

use super::SERVER_TARGET;
use super::client::ClientOptions;
use super::error::ServerError;
use super::handler::RpcHandler;
use super::session::spawn_session;
use crate::connection::{Dispatcher, ListenerConnection, ListenerSource};
use crate::transport::{ConnectionStream, SocketListener};
use crate::worker::{Worker, WorkerContext, WorkerError};

/// Settings for an [`RpcServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Sleep between listener polls while idle.
    pub poll_interval: Duration,
    /// Settings applied to every accepted session.
    pub session: ClientOptions,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServerOptions {
    /// Derives options from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            session: ClientOptions::from_config(config),
        }
    }
}

/// Starts a session for each accepted stream.
///
/// Runs on a relay worker: the session's dispatch loop becomes a child of the
/// relay, and [`RpcHandler::on_connect`] runs on the relay's own thread.
struct SessionDispatcher {
    options: ClientOptions,
    handler: Arc<dyn RpcHandler>,
}

impl Dispatcher<ConnectionStream> for SessionDispatcher {
    fn dispatch(&self, relay: &WorkerContext, stream: ConnectionStream) {
        let label = stream.peer_label();
        info!(
            target: SERVER_TARGET,
            endpoint = %relay.label(),
            peer = %label,
            "accepted connection"
        );
        let handler = Arc::clone(&self.handler);
        let started = spawn_session(
            relay.child(label.as_str()),
            stream,
            self.options.framing,
            self.options.request_timeout,
            Arc::clone(&self.handler),
            |peer| handler.on_connect(peer),
        );
        if let Err(error) = started {
            warn!(
                target: SERVER_TARGET,
                peer = %label,
                error = %error,
                "failed to start session"
            );
        }
    }
}

/// A listening endpoint that serves each connection with an RPC session.
///
/// Each accepted connection holds two workers: the relay that ran the
/// connect hook and now waits for its child, and the session's dispatch loop.
#[derive(Debug)]
pub struct RpcServer {
    endpoint: SocketEndpoint,
    local_addr: Option<SocketAddr>,
    worker: Worker,
}

impl RpcServer {
    /// Binds `endpoint` and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the listener cannot be bound or its
    /// worker cannot start.
    pub fn bind(
        endpoint: &SocketEndpoint,
        options: &ServerOptions,
        handler: Arc<dyn RpcHandler>,
    ) -> Result<Self, ServerError> {
        let listener = SocketListener::bind(endpoint)?;
        let local_addr = listener.local_addr();
        let bound = match (endpoint, local_addr) {
            (SocketEndpoint::Tcp { .. }, Some(addr)) => {
                SocketEndpoint::tcp(addr.ip().to_string(), addr.port())
            }
            _ => endpoint.clone(),
        };
        let dispatcher = Arc::new(SessionDispatcher {
            options: options.session.clone(),
            handler,
        });
        let worker = ListenerConnection::new(
            ListenerSource::new(listener, options.poll_interval),
            dispatcher,
        )
        .spawn(Worker::builder(bound.to_string()))?;
        info!(
            target: SERVER_TARGET,
            endpoint = %bound,
            "rpc server listening"
        );
        Ok(Self {
            endpoint: bound,
            local_addr,
            worker,
        })
    }

    /// Endpoint clients can connect to. TCP endpoints carry the bound port.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Root worker of the accept loop.
    #[must_use]
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Number of connections whose sessions are still running.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.worker.child_count()
    }

    /// Stops accepting and closes every session. Does not wait.
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }

    /// Waits for the accept loop and every session to finish.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the accept worker panicked.
    pub fn join(&self) -> Result<(), WorkerError> {
        self.worker.join()
    }
}
