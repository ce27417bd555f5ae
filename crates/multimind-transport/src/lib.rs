//! MultiMind Transport Layer
//!
//! WebSocket listener for MultiMind clients. The transport handles:
//! - Connection lifecycle (open, message, close)
//! - Handing the authorization token to the broker and closing refused sockets
//! - Pumping frames between the socket and the client's session
//! - Connection limits and the health endpoint
//!
//! The transport is decoupled from broker logic via the `ConnectionHandler`
//! trait.

pub mod handler;
pub mod server;

pub use handler::{ClientSession, ConnectionHandler, OpenRequest};
pub use server::{TransportConfig, TransportError, TransportServer};
