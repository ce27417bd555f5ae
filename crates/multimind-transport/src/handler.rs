//! Seam between the socket pump and the broker.

use std::future::Future;
use std::net::SocketAddr;

use multimind_protocol::{AuthError, BusMessage};
use tokio::sync::broadcast;

/// What the transport knows about a socket before it is authenticated.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Transport-assigned connection id
    pub client_id: String,
    pub remote_addr: SocketAddr,
    /// Raw `authorization` query parameter, if present
    pub authorization: Option<String>,
}

/// Implemented by the broker; called by the transport for every socket.
pub trait ConnectionHandler: Send + Sync + 'static {
    type Session: ClientSession;

    /// Authenticate and attach a new socket. An error closes it with the
    /// error's close code.
    fn on_open(
        &self,
        request: OpenRequest,
    ) -> impl Future<Output = Result<Self::Session, AuthError>> + Send;

    /// Inbound frame from an attached client, in the order it was sent.
    fn on_message(
        &self,
        session: &Self::Session,
        message: BusMessage,
    ) -> impl Future<Output = ()> + Send;

    /// Socket gone. Called exactly once per successful `on_open`.
    fn on_close(&self, session: Self::Session) -> impl Future<Output = ()> + Send;

    /// Extra fields merged into the `/health` response.
    fn health(&self) -> serde_json::Value {
        serde_json::Value::Object(Default::default())
    }
}

/// An attached client as the socket pump sees it.
pub trait ClientSession: Send + Sync + 'static {
    fn client_id(&self) -> &str;

    /// Outbound event stream. `None` when there is nothing to attach to.
    fn subscribe(&self) -> Option<broadcast::Receiver<BusMessage>>;

    /// Whether an outbound event may be written to this client.
    fn accepts(&self, message: &BusMessage) -> bool;

    /// First frame sent after a successful open.
    fn welcome(&self) -> BusMessage;
}
