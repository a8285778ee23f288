//! Error types for the RPC layer.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;

use super::message::{RpcErrorObject, codes};
use crate::codec::CodecError;
use crate::transport::{ConnectError, ListenerError};
use crate::worker::WorkerError;

/// Failure of an outbound call made through an [`RpcPeer`](super::RpcPeer).
#[derive(Debug, Error)]
pub enum RpcError {
    /// No response arrived before the deadline. A late response is routed
    /// to the unsolicited-response hook.
    #[error("request {id} timed out after {timeout:?}")]
    Timeout {
        /// Id of the abandoned request.
        id: i64,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The peer answered with an error object.
    #[error("request {id} failed remotely ({}): {}", error.code, error.message)]
    Remote {
        /// Id of the failed request.
        id: i64,
        /// Error object sent by the peer.
        error: RpcErrorObject,
    },
    /// The connection closed before or while the call was in flight.
    #[error("connection closed")]
    ConnectionClosed,
    /// Writing the message failed.
    #[error("failed to send message: {0}")]
    Send(#[source] CodecError),
    /// Parameters could not be serialised.
    #[error("failed to encode parameters: {0}")]
    Encode(#[source] serde_json::Error),
    /// The result did not match the expected type.
    #[error("failed to decode result: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RpcError {
    /// Error object sent by the peer, for [`RpcError::Remote`].
    #[must_use]
    pub fn remote(&self) -> Option<&RpcErrorObject> {
        match self {
            Self::Remote { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Failure reported by a request or notification handler.
///
/// Request handler failures are sent back to the caller as the response's
/// `error` member; the code defaults to zero.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    pub data: Option<Value>,
}

impl HandlerError {
    /// Builds an error with code zero.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(0, message)
    }

    /// Builds an error with an explicit code.
    #[must_use]
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// No handler is registered for `method`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::with_code(codes::METHOD_NOT_FOUND, "method not found")
            .with_data(json!({ "method": method }))
    }

    /// The parameters were rejected.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::with_code(codes::INVALID_PARAMS, message)
    }

    /// The handler failed unexpectedly.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_code(codes::INTERNAL_ERROR, message)
    }

    /// Converts any error, keeping its source chain as `data.causes`.
    #[must_use]
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let causes: Vec<Value> = std::iter::successors(error.source(), |&cause| cause.source())
            .map(|cause| Value::String(cause.to_string()))
            .collect();
        let converted = Self::new(error.to_string());
        if causes.is_empty() {
            converted
        } else {
            converted.with_data(json!({ "causes": causes }))
        }
    }

    /// Wire representation of the error.
    #[must_use]
    pub fn into_error_object(self) -> RpcErrorObject {
        RpcErrorObject {
            code: self.code,
            message: self.message,
            data: self.data,
        }
    }
}

impl From<RpcErrorObject> for HandlerError {
    fn from(error: RpcErrorObject) -> Self {
        Self {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self::invalid_params(error.to_string())
    }
}

/// Failure to start an [`RpcClient`](super::RpcClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint could not be reached.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// The stream could not be split into read and write halves.
    #[error("failed to clone connection stream: {0}")]
    Stream(#[source] io::Error),
    /// The dispatch worker could not start.
    #[error(transparent)]
    Spawn(#[from] WorkerError),
}

/// Failure to start an [`RpcServer`](super::RpcServer).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error(transparent)]
    Bind(#[from] ListenerError),
    /// The accept worker could not start.
    #[error(transparent)]
    Spawn(#[from] WorkerError),
}
