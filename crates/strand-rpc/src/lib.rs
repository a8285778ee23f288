//! Synchronous, thread-per-connection JSON-RPC runtime.
//!
//! The crate is built in layers. [`worker`] provides supervised OS threads
//! arranged in a parent/child tree with cooperative, depth-first shutdown.
//! [`connection`] runs a read loop on a worker and hands every value it
//! produces to a fresh child worker. [`rpc`] applies that pattern twice: a
//! listener loop yields accepted streams, and each stream's loop yields
//! decoded JSON-RPC messages that are answered, notified, or correlated with
//! a caller blocked in [`RpcPeer::request`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use strand_rpc::{ClientOptions, MethodRouter, RpcClient, RpcServer, ServerOptions};
//! use strand_config::SocketEndpoint;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let router = MethodRouter::new().request("echo", |_, params| Ok(params));
//! let server = RpcServer::bind(
//!     &SocketEndpoint::tcp("127.0.0.1", 0),
//!     &ServerOptions::default(),
//!     Arc::new(router),
//! )?;
//! let client = RpcClient::connect(
//!     server.endpoint(),
//!     &ClientOptions::default(),
//!     Arc::new(MethodRouter::new()),
//! )?;
//! assert_eq!(client.peer().request("echo", json!([1, 2, 3]))?, json!([1, 2, 3]));
//! server.shutdown();
//! server.join()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod rpc;
pub mod transport;
pub mod worker;

pub use self::connection::{Connection, Dispatcher, ListenerConnection, ListenerSource, ReadLoop};
pub use self::rpc::{
    ClientError, ClientOptions, HandlerError, InboundMessage, MethodRouter, Reply, RequestOptions,
    Response, RpcClient, RpcError, RpcErrorObject, RpcHandler, RpcPeer, RpcServer, ServerError,
    ServerOptions,
};
pub use self::transport::{ConnectionStream, SocketListener};
pub use self::worker::{ThreadRelay, Worker, WorkerBuilder, WorkerContext, WorkerError, WorkerId};

#[cfg(test)]
mod tests;
