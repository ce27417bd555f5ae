//! MultiMind protocol types.
//!
//! Wire-level vocabulary shared by the transport, the broker and the skill
//! runtime: bus messages, the authorization token carried on the upgrade
//! request, rejection errors and their WebSocket close codes, and the
//! well-known message type names.

pub mod auth;
pub mod error;
pub mod message;
pub mod types;

pub use auth::AuthToken;
pub use error::{AuthError, CloseCode};
pub use message::{BusMessage, SessionContext};
pub use types::MessageTypes;
