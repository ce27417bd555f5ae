//! Broker configuration.
//!
//! Every field has a default; a JSON file may override any subset, and the
//! command line overrides the file.

use std::path::{Path, PathBuf};

use multimind_skills::{CapabilityRegistry, DEFAULT_SKILLS};
use multimind_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accounts::MemoryAccessKeyStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Hostname to bind to
    pub host: String,
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Refuse clients that cannot end up with an encryption key
    pub require_crypto: bool,
    /// Whether a key-agreement handshake is available to clients
    pub handshake_enabled: bool,
    /// Buffered messages per worker bus
    pub bus_capacity: usize,
    /// Skills seeded for access keys seen for the first time
    pub default_skills: Vec<String>,
    /// Skill allow-list database
    pub skills_path: PathBuf,
    /// Client (access key) database
    pub clients_path: PathBuf,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5678,
            max_connections: Some(64),
            require_crypto: false,
            handshake_enabled: true,
            bus_capacity: 1024,
            default_skills: DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect(),
            skills_path: CapabilityRegistry::default_path(),
            clients_path: MemoryAccessKeyStore::default_path(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Encryption policy applied during authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub handshake_enabled: bool,
    pub require_crypto: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            handshake_enabled: true,
            require_crypto: false,
        }
    }
}

impl BrokerConfig {
    /// Read a JSON config file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy {
            handshake_enabled: self.handshake_enabled,
            require_crypto: self.require_crypto,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            port: self.port,
            hostname: self.host.clone(),
            max_connections: self.max_connections,
        }
    }
}
