//! JSON-RPC 2.0 message shapes and classification of inbound values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Protocol version stamped on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes.
pub mod codes {
    /// The payload was not valid JSON.
    pub const PARSE_ERROR: i64 = -32_700;
    /// The value was not a valid request object.
    pub const INVALID_REQUEST: i64 = -32_600;
    /// No handler is registered for the method.
    pub const METHOD_NOT_FOUND: i64 = -32_601;
    /// The method's parameters were rejected.
    pub const INVALID_PARAMS: i64 = -32_602;
    /// The handler failed unexpectedly.
    pub const INTERNAL_ERROR: i64 = -32_603;
}

/// Structured error carried in a response's `error` member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Builds an error object without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(String::from("code"), Value::from(self.code));
        object.insert(String::from("message"), Value::from(self.message.as_str()));
        if let Some(data) = &self.data {
            object.insert(String::from("data"), data.clone());
        }
        Value::Object(object)
    }
}

pub(crate) fn request_frame(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "method": method, "params": params, "id": id })
}

pub(crate) fn notification_frame(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "method": method, "params": params })
}

pub(crate) fn response_frame(id: &Value, outcome: Result<Value, RpcErrorObject>) -> Value {
    match outcome {
        Ok(result) => json!({ "jsonrpc": JSONRPC_VERSION, "result": result, "id": id }),
        Err(error) => json!({ "jsonrpc": JSONRPC_VERSION, "error": error.to_value(), "id": id }),
    }
}

/// A decoded response: the echoed id and either a result or an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id as received. Correlated responses carry an integer.
    pub id: Value,
    /// `Ok(result)` or `Err(error)`.
    pub outcome: Result<Value, RpcErrorObject>,
}

impl Response {
    /// Returns the id when it can correlate with an outbound request.
    #[must_use]
    pub fn correlation_id(&self) -> Option<i64> {
        self.id.as_i64()
    }
}

/// Classification of one inbound JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Carries both `method` and `id`.
    Request {
        /// Id to echo in the reply.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters; `null` when absent.
        params: Value,
    },
    /// Carries `method` but no `id`.
    Notification {
        /// Method name.
        method: String,
        /// Parameters; `null` when absent.
        params: Value,
    },
    /// Carries `result` or `error`.
    Response(Response),
    /// Matches none of the shapes above.
    Invalid {
        /// Id of the offending value, when one could be read.
        id: Option<Value>,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

impl InboundMessage {
    /// Classifies a decoded value by the members it carries.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::Invalid {
                id: None,
                reason: "message is not a JSON object",
            };
        };
        let id = object.remove("id");
        let params = object.remove("params").unwrap_or(Value::Null);

        match object.remove("method") {
            Some(Value::String(method)) => match id {
                Some(id) => Self::Request { id, method, params },
                None => Self::Notification { method, params },
            },
            Some(_) => Self::Invalid {
                id,
                reason: "method is not a string",
            },
            None => classify_response(id, &mut object),
        }
    }
}

fn classify_response(id: Option<Value>, object: &mut Map<String, Value>) -> InboundMessage {
    let result = object.remove("result");
    let error = object.remove("error");
    let outcome = match (result, error) {
        (Some(result), None) => Ok(result),
        (None, Some(error)) => match serde_json::from_value::<RpcErrorObject>(error) {
            Ok(error) => Err(error),
            Err(_) => {
                return InboundMessage::Invalid {
                    id,
                    reason: "error member is malformed",
                };
            }
        },
        (Some(_), Some(_)) => {
            return InboundMessage::Invalid {
                id,
                reason: "response carries both result and error",
            };
        }
        (None, None) => {
            return InboundMessage::Invalid {
                id,
                reason: "message has neither method nor result",
            };
        }
    };
    InboundMessage::Response(Response {
        id: id.unwrap_or(Value::Null),
        outcome,
    })
}
