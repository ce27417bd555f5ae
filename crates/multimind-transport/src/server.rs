//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket, hands the authorization token to the
//! connection handler, and pumps frames between the socket and the client's
//! session until either side goes away.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        ConnectInfo, Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use multimind_protocol::{AuthError, BusMessage, MessageTypes};
use serde_json::json;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::handler::{ClientSession, ConnectionHandler, OpenRequest};

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 5678,
            hostname: "127.0.0.1".into(),
            max_connections: Some(64),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state for the transport server.
struct AppState<H: ConnectionHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    /// Connected socket count (for health check and connection limit)
    client_count: AtomicUsize,
}

/// The transport server: accepts WebSocket connections and pumps frames.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Bind and start serving. Returns once the listener is bound.
    pub async fn start<H: ConnectionHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            client_count: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("MultiMind listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await;
            if let Err(e) = served {
                error!("Transport server exited with error: {e}");
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("MultiMind transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: ConnectionHandler>(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        let current = state.client_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    let authorization = query.get("authorization").cloned();
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, remote_addr, authorization))
        .into_response()
}

async fn health_handler<H: ConnectionHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    let mut body = json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Relaxed),
    });
    if let (Some(body), serde_json::Value::Object(extra)) =
        (body.as_object_mut(), state.handler.health())
    {
        body.extend(extra);
    }
    Json(body)
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: ConnectionHandler>(
    socket: WebSocket,
    state: Arc<AppState<H>>,
    remote_addr: SocketAddr,
    authorization: Option<String>,
) {
    state.client_count.fetch_add(1, Ordering::Relaxed);

    let client_id = uuid::Uuid::new_v4().to_string();
    debug!("Socket accepted: {client_id} from {remote_addr}");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let request = OpenRequest {
        client_id: client_id.clone(),
        remote_addr,
        authorization,
    };

    let session = match state.handler.on_open(request).await {
        Ok(session) => session,
        Err(e) => {
            reject(&mut ws_tx, &client_id, &e).await;
            state.client_count.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    };

    pump(&mut ws_tx, &mut ws_rx, &state.handler, &session).await;

    state.handler.on_close(session).await;
    state.client_count.fetch_sub(1, Ordering::Relaxed);
    info!("Client disconnected: {client_id} (total: {})",
        state.client_count.load(Ordering::Relaxed));
}

/// Move frames both ways until the socket closes or the session's event
/// stream ends. Inbound frames are handed over one at a time, so a client's
/// send order is preserved.
async fn pump<H: ConnectionHandler>(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut futures_util::stream::SplitStream<WebSocket>,
    handler: &Arc<H>,
    session: &H::Session,
) {
    let client_id = session.client_id().to_string();

    let Some(mut outbound) = session.subscribe() else {
        warn!("No event stream for {client_id}, closing");
        return;
    };

    if send_message(ws_tx, &session.welcome()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            // Incoming WebSocket frame
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match BusMessage::from_json(&text) {
                            Ok(message) => handler.on_message(session, message).await,
                            Err(e) => {
                                debug!("Unparseable frame from {client_id}: {e}");
                                let err = BusMessage::new(
                                    MessageTypes::ILLEGAL_MESSAGE,
                                    json!({ "reason": format!("invalid message: {e}") }),
                                );
                                if send_message(ws_tx, &err).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed: {client_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {client_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            // Worker bus events for this client
            event = outbound.recv() => {
                match event {
                    Ok(message) => {
                        if !session.accepts(&message) {
                            continue;
                        }
                        if let Err(e) = send_message(ws_tx, &message).await {
                            error!("Failed to deliver to {client_id}: {e}");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {client_id} lagged, {skipped} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event stream ended for {client_id}");
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn send_message(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &BusMessage,
) -> Result<(), axum::Error> {
    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!("Dropping unserializable {} message: {e}", message.msg_type);
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(text.into())).await
}

async fn reject(ws_tx: &mut SplitSink<WebSocket, Message>, client_id: &str, err: &AuthError) {
    warn!("Connection {client_id} refused: {err}");
    let frame = CloseFrame {
        code: err.close_code().code(),
        reason: err.close_reason().into(),
    };
    let _ = ws_tx.send(Message::Close(Some(frame))).await;
}
