//! MultiMind session broker.
//!
//! Authenticates clients against an access-key store, resolves each key to
//! its allowed skills, and routes every connection to a shared worker keyed
//! by access key. Workers are created on first use and stopped when their
//! last connection goes away.

pub mod accounts;
pub mod admin;
pub mod config;
pub mod connection;
pub mod events;
pub mod pool;
pub mod service;
pub mod worker;

pub use accounts::{AccessKeyStore, Account, MemoryAccessKeyStore, StoreError};
pub use admin::AdminError;
pub use config::{BrokerConfig, ConfigError, SecurityPolicy};
pub use connection::{BrokerHandler, BrokerSession, Connection, NodeType};
pub use events::BrokerEvent;
pub use pool::WorkerPool;
pub use service::{BrokerError, LifecycleHooks, LoggingHooks, MultiMind};
pub use worker::{Worker, WorkerHandle, WorkerState};
