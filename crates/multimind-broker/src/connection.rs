//! Per-connection authentication and routing.
//!
//! `BrokerHandler` is the transport's [`ConnectionHandler`]: it turns an
//! authorization token into an authenticated [`Connection`] attached to the
//! worker for its access key, injects the client's frames into that worker's
//! bus, and releases the worker reference when the socket closes.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use multimind_protocol::{AuthError, AuthToken, BusMessage, MessageTypes};
use multimind_skills::{CapabilityRegistry, MessageBus};
use multimind_transport::{ClientSession, ConnectionHandler, OpenRequest};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::accounts::{AccessKeyStore, Account};
use crate::config::SecurityPolicy;
use crate::events::BrokerEvent;
use crate::pool::WorkerPool;
use crate::worker::{Worker, WorkerHandle};

/// Role of the peer in the hive. Every broker client is a plain node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Node,
}

/// An authenticated client connection.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Transport-assigned connection id
    pub id: String,
    pub remote_addr: SocketAddr,
    /// Name the client claimed in its token
    pub name: String,
    pub access_key: String,
    pub session_id: String,
    pub node_type: NodeType,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    /// Account has a pre-shared crypto key
    pub has_crypto_key: bool,
    /// Account has a pre-shared password for a password handshake
    pub password_handshake: bool,
    pub authenticated: bool,
    /// The pool owns the worker; connections only point at it
    worker: Weak<Worker>,
}

impl Connection {
    pub fn worker(&self) -> Option<WorkerHandle> {
        self.worker.upgrade()
    }
}

/// The transport-facing view of an attached client.
pub struct BrokerSession {
    connection: Connection,
    account: Arc<Account>,
    bus: MessageBus,
}

impl BrokerSession {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// The worker this client is routed to, while it is alive.
    pub fn worker_handle(&self) -> Option<WorkerHandle> {
        self.connection.worker()
    }
}

impl ClientSession for BrokerSession {
    fn client_id(&self) -> &str {
        &self.connection.id
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<BusMessage>> {
        self.bus.subscribe()
    }

    fn accepts(&self, message: &BusMessage) -> bool {
        self.account.permits(&message.msg_type)
    }

    fn welcome(&self) -> BusMessage {
        let skills = self
            .worker_handle()
            .map(|w| w.loaded_skills())
            .unwrap_or_default();
        BusMessage::new(
            MessageTypes::CLIENT_CONNECTED,
            json!({
                "clientId": self.connection.id,
                "sessionId": self.connection.session_id,
                "name": self.connection.name,
                "skills": skills,
            }),
        )
    }
}

/// Authenticates sockets and routes them to pooled workers.
pub struct BrokerHandler {
    accounts: Arc<dyn AccessKeyStore>,
    capabilities: Arc<CapabilityRegistry>,
    pool: Arc<WorkerPool>,
    policy: SecurityPolicy,
    events: broadcast::Sender<BrokerEvent>,
    clients: DashMap<String, Connection>,
}

impl BrokerHandler {
    pub fn new(
        accounts: Arc<dyn AccessKeyStore>,
        capabilities: Arc<CapabilityRegistry>,
        pool: Arc<WorkerPool>,
        policy: SecurityPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            accounts,
            capabilities,
            pool,
            policy,
            events,
            clients: DashMap::new(),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Observe connection events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events.subscribe()
    }

    /// Snapshot of attached connections.
    pub fn clients(&self) -> Vec<Connection> {
        self.clients.iter().map(|c| c.value().clone()).collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn emit(&self, event: BrokerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Skills for `access_key`. A registry that cannot persist the seed still
    /// lets the client in with the default set.
    fn resolve_skills(&self, access_key: &str) -> Vec<String> {
        match self.capabilities.get(access_key) {
            Ok(skills) => skills,
            Err(e) => {
                error!(access_key, "Could not resolve skills, using defaults: {e}");
                self.capabilities.defaults().to_vec()
            }
        }
    }
}

impl ConnectionHandler for BrokerHandler {
    type Session = BrokerSession;

    async fn on_open(&self, request: OpenRequest) -> Result<BrokerSession, AuthError> {
        let token = request
            .authorization
            .as_deref()
            .ok_or_else(|| AuthError::MalformedToken("missing authorization".into()))
            .and_then(AuthToken::decode)?;
        info!("Authorizing client: {}", token.name);

        let Some(account) = self.accounts.lookup(&token.access_key) else {
            error!("Client provided an invalid access key");
            self.emit(BrokerEvent::InvalidKey {
                client_id: request.client_id,
                name: token.name,
                remote_addr: request.remote_addr,
            });
            return Err(AuthError::InvalidKey);
        };

        if account.crypto_key.is_none()
            && !self.policy.handshake_enabled
            && self.policy.require_crypto
        {
            error!(
                "No pre-shared crypto key for client and handshake disabled, \
                 but configured to require crypto!"
            );
            self.emit(BrokerEvent::ProtocolRejected {
                client_id: request.client_id,
                name: token.name,
                remote_addr: request.remote_addr,
            });
            return Err(AuthError::ProtocolPolicy);
        }

        let skills = self.resolve_skills(&token.access_key);
        info!("Assigning worker for client: {}", token.name);
        debug!("Available skills: {skills:?}");

        let worker = self.pool.acquire(&token.access_key, &skills).await;

        let connection = Connection {
            id: request.client_id,
            remote_addr: request.remote_addr,
            name: token.name,
            access_key: token.access_key,
            session_id: uuid::Uuid::new_v4().to_string(),
            node_type: NodeType::Node,
            connected_at: chrono::Utc::now(),
            has_crypto_key: account.crypto_key.is_some(),
            password_handshake: account.shared_password.is_some(),
            authenticated: true,
            worker: Arc::downgrade(&worker),
        };

        self.clients.insert(connection.id.clone(), connection.clone());
        self.emit(BrokerEvent::ClientConnected {
            client_id: connection.id.clone(),
            name: connection.name.clone(),
            access_key: connection.access_key.clone(),
            remote_addr: connection.remote_addr,
        });
        info!(client_id = %connection.id, "Client connected: {}", connection.name);

        Ok(BrokerSession {
            connection,
            account,
            bus: worker.bus().clone(),
        })
    }

    async fn on_message(&self, session: &BrokerSession, mut message: BusMessage) {
        let connection = &session.connection;
        if session.account.blacklist.contains(&message.msg_type) {
            warn!(client_id = %connection.id, "Dropping blacklisted message: {}", message.msg_type);
            return;
        }

        let context = &mut message.context;
        context.source = Some(connection.id.clone());
        context.session = Some(connection.session_id.clone());
        context.peer = Some(connection.name.clone());
        if context.destination.is_none() {
            context.destination = Some("skills".into());
        }

        if session.bus.publish(message) == 0 {
            debug!(client_id = %connection.id, "Message published with no listeners");
        }
    }

    async fn on_close(&self, session: BrokerSession) {
        let connection = session.connection;
        self.clients.remove(&connection.id);
        self.pool.release(&connection.access_key);
        info!(client_id = %connection.id, "Client disconnected: {}", connection.name);
        self.emit(BrokerEvent::ClientDisconnected {
            client_id: connection.id,
            name: connection.name,
            access_key: connection.access_key,
        });
    }

    fn health(&self) -> serde_json::Value {
        json!({
            "workers": self.pool.len(),
            "workersCreated": self.pool.created_count(),
        })
    }
}
