//! JSON-RPC sessions layered on the worker tree.
//!
//! A session is a [`Connection`](crate::connection::Connection) over the
//! decoded values of one stream. Each value is dispatched on its own worker:
//! requests run the [`RpcHandler`] and are answered through the session's
//! [`RpcPeer`], notifications run the handler without a reply, and responses
//! wake the caller blocked in [`RpcPeer::request`].

mod client;
mod error;
mod handler;
mod message;
mod peer;
mod pending;
mod router;
mod server;
mod session;

pub use self::client::{ClientOptions, RpcClient};
pub use self::error::{ClientError, HandlerError, RpcError, ServerError};
pub use self::handler::RpcHandler;
pub use self::message::{InboundMessage, JSONRPC_VERSION, Response, RpcErrorObject, codes};
pub use self::peer::{Reply, RequestOptions, RpcPeer};
pub use self::router::MethodRouter;
pub use self::server::{RpcServer, ServerOptions};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");
const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
