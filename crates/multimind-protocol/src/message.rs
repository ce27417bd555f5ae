//! Bus message envelope.
//!
//! Every frame on the wire and every event on a worker's internal bus is a
//! `BusMessage`: a type name, a structured payload and the session context
//! the message travels with.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed event on a worker bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default)]
    pub context: SessionContext,
}

/// Session metadata attached to a message.
///
/// Known routing fields are typed; anything else a client or skill attaches
/// survives round-tripping through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Connection that injected the message, if it came from a client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Intended recipient (e.g. "skills")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Session identifier of the originating connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Name the originating client claimed in its authorization token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl BusMessage {
    pub fn new(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            context: SessionContext::default(),
        }
    }

    pub fn with_context(mut self, context: SessionContext) -> Self {
        self.context = context;
        self
    }

    /// Build a reply that keeps this message's context with source and
    /// destination swapped, so the answer routes back to whoever asked.
    pub fn reply(&self, msg_type: impl Into<String>, data: Value) -> Self {
        let mut context = self.context.clone();
        std::mem::swap(&mut context.source, &mut context.destination);
        Self {
            msg_type: msg_type.into(),
            data,
            context,
        }
    }

    /// Same payload and context under a different type name.
    pub fn forward(&self, msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: self.data.clone(),
            context: self.context.clone(),
        }
    }

    /// Convenience accessor for string fields in `data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
