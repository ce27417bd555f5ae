//! Access-key store boundary.
//!
//! The broker only ever reads accounts. `MemoryAccessKeyStore` is the
//! in-process implementation; it can be filled from the JSON client database
//! written by the administrative tooling.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Credentials and message policy for one access key.
#[derive(Debug)]
pub struct Account {
    pub access_key: String,
    pub name: String,
    /// Pre-shared symmetric key; `None` means the key must be negotiated
    pub crypto_key: Option<SecretString>,
    /// Pre-shared password a password handshake can derive a key from
    pub shared_password: Option<SecretString>,
    /// Message types never exchanged with this client
    pub blacklist: HashSet<String>,
    /// When set, the only message types delivered to this client
    pub allowed_types: Option<HashSet<String>>,
}

impl Account {
    pub fn new(name: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            name: name.into(),
            crypto_key: None,
            shared_password: None,
            blacklist: HashSet::new(),
            allowed_types: None,
        }
    }

    pub fn with_crypto_key(mut self, key: impl Into<String>) -> Self {
        self.crypto_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.shared_password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_blacklist<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Whether an event of `msg_type` may be delivered to this client.
    pub fn permits(&self, msg_type: &str) -> bool {
        if self.blacklist.contains(msg_type) {
            return false;
        }
        self.allowed_types
            .as_ref()
            .is_none_or(|allowed| allowed.contains(msg_type))
    }
}

/// Read-only lookup of accounts by access key.
pub trait AccessKeyStore: Send + Sync {
    fn lookup(&self, access_key: &str) -> Option<Arc<Account>>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read client database {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid client database {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Accounts held in memory.
#[derive(Default)]
pub struct MemoryAccessKeyStore {
    accounts: RwLock<HashMap<String, Arc<Account>>>,
}

/// One record of the JSON client database.
#[derive(Deserialize)]
struct ClientRecord {
    name: String,
    api_key: String,
    #[serde(default)]
    crypto_key: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    blacklist: ClientBlacklist,
    #[serde(default)]
    allowed_types: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
struct ClientBlacklist {
    #[serde(default)]
    messages: Vec<String>,
}

impl MemoryAccessKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of client records. A missing file yields an empty store.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No client database at {}", path.display());
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let records: Vec<ClientRecord> =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let store = Self::new();
        for record in records {
            let mut account = Account::new(record.name, record.api_key)
                .with_blacklist(record.blacklist.messages);
            if let Some(key) = record.crypto_key.filter(|k| !k.is_empty()) {
                account = account.with_crypto_key(key);
            }
            if let Some(password) = record.password.filter(|p| !p.is_empty()) {
                account = account.with_password(password);
            }
            if let Some(types) = record.allowed_types {
                account = account.with_allowed_types(types);
            }
            store.insert(account);
        }
        debug!("Loaded {} clients from {}", store.len(), path.display());
        Ok(store)
    }

    /// `<data dir>/hivemind-core/clients.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("hivemind-core")
            .join("clients.json")
    }

    pub fn insert(&self, account: Account) {
        self.accounts
            .write()
            .insert(account.access_key.clone(), Arc::new(account));
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

impl AccessKeyStore for MemoryAccessKeyStore {
    fn lookup(&self, access_key: &str) -> Option<Arc<Account>> {
        self.accounts.read().get(access_key).cloned()
    }
}
