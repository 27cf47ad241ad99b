// src/connection/session.rs

//! Defines the opaque session identifier handed out at acceptance time.

use crate::core::WsplexError;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The longest session id accepted from an untrusted source.
const MAX_UNTRUSTED_LEN: usize = 64;

/// An opaque, globally unique identifier for one logical connection.
///
/// Cloning is cheap: the underlying string is reference-counted, so the same
/// id can live in the registry, in queued deliveries and in log lines at once.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Generates a fresh random (v4 UUID) session id.
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Validates a session id received from a client-controlled source such as
    /// an HTTP query parameter. Only canonical UUIDs are accepted.
    pub fn parse_untrusted(raw: &str) -> Result<Self, WsplexError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(WsplexError::InvalidSessionId("empty".to_string()));
        }
        if raw.len() > MAX_UNTRUSTED_LEN {
            return Err(WsplexError::InvalidSessionId(format!(
                "longer than {MAX_UNTRUSTED_LEN} bytes"
            )));
        }
        let uuid = Uuid::parse_str(raw)?;
        Ok(Self(Arc::from(uuid.hyphenated().to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", &self.0)
    }
}
