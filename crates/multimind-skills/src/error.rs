//! Skill and registry error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure inside a single skill. Never fatal to the worker hosting it.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill {skill} failed to load: {reason}")]
    Load { skill: String, reason: String },

    #[error("skill {skill} failed handling {msg_type}: {reason}")]
    Handler {
        skill: String,
        msg_type: String,
        reason: String,
    },
}

/// Failure of a capability registry operation. No partial mutation is ever
/// left behind when one of these is returned.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("access key {0} has no skill entry yet")]
    UnknownKey(String),

    #[error("no skills registered for access key {0}")]
    KeyNotFound(String),

    #[error("skill {skill} is not allowed for access key {access_key}")]
    CapabilityNotFound { access_key: String, skill: String },

    #[error("failed to persist skill registry at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt skill registry at {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_) | Self::CapabilityNotFound { .. })
    }
}
