//! Name-based routing of requests and notifications to closures.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use super::CLIENT_TARGET;
use super::error::HandlerError;
use super::handler::RpcHandler;
use super::message::Response;
use super::peer::RpcPeer;

type RequestFn = dyn Fn(&RpcPeer, Value) -> Result<Value, HandlerError> + Send + Sync;
type NotificationFn = dyn Fn(&RpcPeer, Value) -> Result<(), HandlerError> + Send + Sync;
type ConnectFn = dyn Fn(&RpcPeer) + Send + Sync;
type UnsolicitedFn = dyn Fn(&RpcPeer, Response) + Send + Sync;

/// [`RpcHandler`] that looks handlers up by method name.
///
/// Requests for unregistered methods are answered with a
/// "method not found" error (-32601).
#[derive(Default)]
pub struct MethodRouter {
    requests: HashMap<String, Box<RequestFn>>,
    notifications: HashMap<String, Box<NotificationFn>>,
    connect: Option<Box<ConnectFn>>,
    unsolicited: Option<Box<UnsolicitedFn>>,
}

impl MethodRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for request `method`, replacing any previous one.
    #[must_use]
    pub fn request<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&RpcPeer, Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.requests.insert(method.into(), Box::new(handler));
        self
    }

    /// Registers the handler for notification `method`.
    #[must_use]
    pub fn notification<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&RpcPeer, Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.notifications.insert(method.into(), Box::new(handler));
        self
    }

    /// Runs `hook` for every new server session.
    #[must_use]
    pub fn with_connect_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RpcPeer) + Send + Sync + 'static,
    {
        self.connect = Some(Box::new(hook));
        self
    }

    /// Receives responses that matched no pending call.
    #[must_use]
    pub fn on_unsolicited<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RpcPeer, Response) + Send + Sync + 'static,
    {
        self.unsolicited = Some(Box::new(hook));
        self
    }

    /// Registered request method names, sorted.
    #[must_use]
    pub fn request_methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.requests.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

impl fmt::Debug for MethodRouter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MethodRouter")
            .field("requests", &self.request_methods())
            .field("notifications", &self.notifications.len())
            .finish_non_exhaustive()
    }
}

impl RpcHandler for MethodRouter {
    fn handle_request(
        &self,
        peer: &RpcPeer,
        method: &str,
        params: Value,
    ) -> Result<Value, HandlerError> {
        let handler = self
            .requests
            .get(method)
            .ok_or_else(|| HandlerError::method_not_found(method))?;
        handler(peer, params)
    }

    fn handle_notification(
        &self,
        peer: &RpcPeer,
        method: &str,
        params: Value,
    ) -> Result<(), HandlerError> {
        let handler = self
            .notifications
            .get(method)
            .ok_or_else(|| HandlerError::method_not_found(method))?;
        handler(peer, params)
    }

    fn on_unsolicited_response(&self, peer: &RpcPeer, response: Response) {
        match &self.unsolicited {
            Some(hook) => hook(peer, response),
            None => {
                debug!(
                    target: CLIENT_TARGET,
                    peer = %peer.label(),
                    id = %response.id,
                    "ignoring unsolicited response"
                );
            }
        }
    }

    fn on_connect(&self, peer: &RpcPeer) {
        if let Some(hook) = &self.connect {
            hook(peer);
        }
    }
}
