//! MultiMind service façade: wires the pool, the handler and the listener,
//! and reports lifecycle progress to the hosting process.

use std::sync::Arc;

use multimind_skills::{CapabilityRegistry, SkillCatalog};
use multimind_transport::{TransportError, TransportServer};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::accounts::AccessKeyStore;
use crate::config::BrokerConfig;
use crate::connection::BrokerHandler;
use crate::events::BrokerEvent;
use crate::pool::WorkerPool;

/// Progress notifications for a supervising process. Every method has a
/// logging default, so implementors override only what they observe.
pub trait LifecycleHooks: Send + Sync {
    fn on_started(&self) {
        info!("MultiMind bus service started!");
    }

    fn on_alive(&self) {
        info!("MultiMind bus service alive");
    }

    fn on_ready(&self) {
        info!("MultiMind bus service ready!");
    }

    fn on_error(&self, reason: &str) {
        error!("MultiMind bus failed to start ({reason})");
    }

    fn on_stopping(&self) {
        info!("MultiMind bus is shutting down...");
    }
}

/// Hooks that only log.
#[derive(Debug, Default)]
pub struct LoggingHooks;

impl LifecycleHooks for LoggingHooks {}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("service already started")]
    AlreadyRunning,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Created,
    Running,
    Stopped,
}

/// The broker service: owns the worker pool and the WebSocket listener.
pub struct MultiMind {
    config: BrokerConfig,
    handler: Arc<BrokerHandler>,
    pool: Arc<WorkerPool>,
    hooks: Arc<dyn LifecycleHooks>,
    transport: Option<TransportServer>,
    state: ServiceState,
}

impl MultiMind {
    pub fn new(
        config: BrokerConfig,
        accounts: Arc<dyn AccessKeyStore>,
        capabilities: Arc<CapabilityRegistry>,
        catalog: SkillCatalog,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(Arc::new(catalog), config.bus_capacity));
        let handler = Arc::new(BrokerHandler::new(
            accounts,
            capabilities,
            pool.clone(),
            config.security_policy(),
        ));

        Self {
            config,
            handler,
            pool,
            hooks: Arc::new(LoggingHooks),
            transport: None,
            state: ServiceState::Created,
        }
    }

    pub fn with_hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn handler(&self) -> &Arc<BrokerHandler> {
        &self.handler
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.handler.subscribe_events()
    }

    /// Bound port once running.
    pub fn port(&self) -> Option<u16> {
        self.transport.as_ref().map(|t| t.port())
    }

    /// Bind the listener and start accepting clients. Returns the bound port.
    pub async fn start(&mut self) -> Result<u16, BrokerError> {
        if self.state != ServiceState::Created {
            return Err(BrokerError::AlreadyRunning);
        }
        self.hooks.on_started();
        self.hooks.on_alive();

        let transport =
            match TransportServer::start(self.config.transport(), self.handler.clone()).await {
                Ok(transport) => transport,
                Err(e) => {
                    self.hooks.on_error(&e.to_string());
                    return Err(e.into());
                }
            };

        let port = transport.port();
        self.transport = Some(transport);
        self.state = ServiceState::Running;
        self.hooks.on_ready();
        Ok(port)
    }

    /// Stop accepting clients, then stop every worker.
    pub async fn stop(&mut self) {
        if self.state != ServiceState::Running {
            return;
        }
        self.hooks.on_stopping();
        self.state = ServiceState::Stopped;

        if let Some(mut transport) = self.transport.take() {
            transport.stop().await;
        }
        self.pool.shutdown_all().await;
        info!("MultiMind stopped");
    }
}
