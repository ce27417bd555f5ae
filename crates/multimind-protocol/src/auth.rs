//! Authorization token carried on the connection request.
//!
//! Clients connect to `ws://host:port/ws?authorization=<token>` where
//! `<token>` is standard base64 of `name:access_key`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::AuthError;

/// Name the client claims plus the access key it presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub name: String,
    pub access_key: String,
}

impl AuthToken {
    pub fn new(name: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_key: access_key.into(),
        }
    }

    /// Decode a base64 `name:key` token.
    ///
    /// The name may not contain `:`; everything after the first separator is
    /// the key. Both halves must be non-empty.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MalformedToken("empty token".into()));
        }

        // Form decoding of the query string turns '+' into ' '.
        let raw = STANDARD
            .decode(token.replace(' ', "+"))
            .map_err(|e| AuthError::MalformedToken(format!("not base64: {e}")))?;
        let decoded = String::from_utf8(raw)
            .map_err(|_| AuthError::MalformedToken("not utf-8".into()))?;

        let (name, key) = decoded
            .split_once(':')
            .ok_or_else(|| AuthError::MalformedToken("missing ':' separator".into()))?;

        if name.is_empty() || key.is_empty() {
            return Err(AuthError::MalformedToken("empty name or key".into()));
        }

        Ok(Self::new(name, key))
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.name, self.access_key))
    }
}
