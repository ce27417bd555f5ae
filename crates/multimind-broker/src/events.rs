//! Notifications for the hosting protocol layer.

use std::net::SocketAddr;

/// Something the broker did with a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Authenticated and attached to its worker
    ClientConnected {
        client_id: String,
        name: String,
        access_key: String,
        remote_addr: SocketAddr,
    },
    /// Attached client went away
    ClientDisconnected {
        client_id: String,
        name: String,
        access_key: String,
    },
    /// Presented an access key the store does not know
    InvalidKey {
        client_id: String,
        name: String,
        remote_addr: SocketAddr,
    },
    /// Refused because encryption is required but cannot be negotiated
    ProtocolRejected {
        client_id: String,
        name: String,
        remote_addr: SocketAddr,
    },
}

impl BrokerEvent {
    pub fn client_id(&self) -> &str {
        match self {
            Self::ClientConnected { client_id, .. }
            | Self::ClientDisconnected { client_id, .. }
            | Self::InvalidKey { client_id, .. }
            | Self::ProtocolRejected { client_id, .. } => client_id,
        }
    }
}
