//! Connection rejection errors and the close codes they map to.

use thiserror::Error;

/// WebSocket close codes sent when a connection is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Authorization token missing or undecodable
    MalformedToken,
    /// Access key not present in the access-key store
    InvalidKey,
    /// Encryption required but no key is available to negotiate it
    ProtocolPolicy,
}

impl CloseCode {
    pub fn code(&self) -> u16 {
        match self {
            Self::MalformedToken => 4001,
            Self::InvalidKey => 4002,
            Self::ProtocolPolicy => 4003,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            4001 => Some(Self::MalformedToken),
            4002 => Some(Self::InvalidKey),
            4003 => Some(Self::ProtocolPolicy),
            _ => None,
        }
    }
}

/// Why a connection was refused before it reached a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("malformed authorization token: {0}")]
    MalformedToken(String),

    #[error("invalid access key")]
    InvalidKey,

    #[error("no pre-shared crypto key and handshake disabled, but encryption is required")]
    ProtocolPolicy,
}

impl AuthError {
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::MalformedToken(_) => CloseCode::MalformedToken,
            Self::InvalidKey => CloseCode::InvalidKey,
            Self::ProtocolPolicy => CloseCode::ProtocolPolicy,
        }
    }

    /// Short reason for the close frame. Never echoes the token.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "Malformed authorization",
            Self::InvalidKey => "Invalid access key",
            Self::ProtocolPolicy => "Encryption required",
        }
    }
}
