//! Application hooks invoked by an RPC session's dispatch workers.

use serde_json::Value;
use tracing::debug;

use super::CLIENT_TARGET;
use super::error::HandlerError;
use super::message::Response;
use super::peer::RpcPeer;

/// Handles inbound traffic on a connection.
///
/// Every method runs on its own dispatch worker, so implementations may
/// block, and may issue calls back to the peer through `peer`.
pub trait RpcHandler: Send + Sync + 'static {
    /// Answers a request. The returned value becomes the response's `result`;
    /// an error becomes its `error` member.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] to report failure to the caller.
    fn handle_request(
        &self,
        peer: &RpcPeer,
        method: &str,
        params: Value,
    ) -> Result<Value, HandlerError>;

    /// Processes a notification. Errors are logged and never sent.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the notification cannot be processed.
    fn handle_notification(
        &self,
        peer: &RpcPeer,
        method: &str,
        params: Value,
    ) -> Result<(), HandlerError> {
        let _ = params;
        debug!(
            target: CLIENT_TARGET,
            peer = %peer.label(),
            method,
            "ignoring notification"
        );
        Ok(())
    }

    /// Receives a response no pending call was waiting for.
    fn on_unsolicited_response(&self, peer: &RpcPeer, response: Response) {
        debug!(
            target: CLIENT_TARGET,
            peer = %peer.label(),
            id = %response.id,
            "ignoring unsolicited response"
        );
    }

    /// Runs on the accepting side once a server session's dispatch loop has
    /// started, concurrently with inbound dispatch.
    fn on_connect(&self, peer: &RpcPeer) {
        let _ = peer;
    }
}
