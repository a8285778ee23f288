//! Socket plumbing for RPC endpoints.
//!
//! Listeners bind TCP or Unix domain sockets and hand out accepted streams;
//! [`connect`] dials an endpoint from the client side. Both produce the same
//! [`ConnectionStream`] so the RPC layer stays transport agnostic.

mod connect;
mod errors;
mod listener;
mod stream;

pub use self::connect::connect;
pub use self::errors::{ConnectError, ListenerError};
pub use self::listener::SocketListener;
pub use self::stream::ConnectionStream;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
