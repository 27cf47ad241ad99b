// src/core/errors.rs

//! Defines the primary error type for the connection core.

use std::os::fd::RawFd;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures the registry, the poller,
/// the dispatcher and the control plane can report.
#[derive(Error, Debug)]
pub enum WsplexError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The kernel could not allocate the readiness object or its descriptors.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(Arc<std::io::Error>),

    /// The readiness object itself is unusable; waiting again cannot succeed.
    #[error("Poller failed: {0}")]
    PollerFailed(Arc<std::io::Error>),

    /// A blocking wait was interrupted by a signal. Callers retry.
    #[error("Wait interrupted by signal")]
    Interrupted,

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Descriptor {0} is not registered")]
    NotRegistered(RawFd),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Connection closed")]
    ConnectionClosed,

    /// The server is stopping and no longer admits sessions.
    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Write timed out after {0} ms")]
    WriteTimeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Every consumer of the delivery queue has gone away.
    #[error("Delivery queue closed")]
    QueueClosed,

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl WsplexError {
    /// Returns true for errors that must be surfaced to the process supervisor
    /// instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WsplexError::ResourceExhausted(_) | WsplexError::PollerFailed(_)
        )
    }

    /// Classifies a raw OS error coming out of a readiness syscall.
    pub(crate) fn from_os(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EINTR) => WsplexError::Interrupted,
            Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOMEM) => {
                WsplexError::ResourceExhausted(Arc::new(err))
            }
            _ => WsplexError::Io(Arc::new(err)),
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for WsplexError {
    fn clone(&self) -> Self {
        match self {
            WsplexError::Io(e) => WsplexError::Io(Arc::clone(e)),
            WsplexError::ResourceExhausted(e) => WsplexError::ResourceExhausted(Arc::clone(e)),
            WsplexError::PollerFailed(e) => WsplexError::PollerFailed(Arc::clone(e)),
            WsplexError::Interrupted => WsplexError::Interrupted,
            WsplexError::AlreadyRegistered(s) => WsplexError::AlreadyRegistered(s.clone()),
            WsplexError::NotRegistered(fd) => WsplexError::NotRegistered(*fd),
            WsplexError::SessionNotFound(s) => WsplexError::SessionNotFound(s.clone()),
            WsplexError::InvalidSessionId(s) => WsplexError::InvalidSessionId(s.clone()),
            WsplexError::ConnectionClosed => WsplexError::ConnectionClosed,
            WsplexError::ShuttingDown => WsplexError::ShuttingDown,
            WsplexError::WriteTimeout(ms) => WsplexError::WriteTimeout(*ms),
            WsplexError::Protocol(s) => WsplexError::Protocol(s.clone()),
            WsplexError::Handshake(s) => WsplexError::Handshake(s.clone()),
            WsplexError::QueueClosed => WsplexError::QueueClosed,
            WsplexError::Internal(s) => WsplexError::Internal(s.clone()),
        }
    }
}

impl PartialEq for WsplexError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (WsplexError::Io(e1), WsplexError::Io(e2)) => e1.kind() == e2.kind(),
            (WsplexError::ResourceExhausted(e1), WsplexError::ResourceExhausted(e2)) => {
                e1.raw_os_error() == e2.raw_os_error()
            }
            (WsplexError::PollerFailed(e1), WsplexError::PollerFailed(e2)) => {
                e1.raw_os_error() == e2.raw_os_error()
            }
            (WsplexError::AlreadyRegistered(s1), WsplexError::AlreadyRegistered(s2)) => s1 == s2,
            (WsplexError::NotRegistered(a), WsplexError::NotRegistered(b)) => a == b,
            (WsplexError::SessionNotFound(s1), WsplexError::SessionNotFound(s2)) => s1 == s2,
            (WsplexError::InvalidSessionId(s1), WsplexError::InvalidSessionId(s2)) => s1 == s2,
            (WsplexError::WriteTimeout(a), WsplexError::WriteTimeout(b)) => a == b,
            (WsplexError::Protocol(s1), WsplexError::Protocol(s2)) => s1 == s2,
            (WsplexError::Handshake(s1), WsplexError::Handshake(s2)) => s1 == s2,
            (WsplexError::Internal(s1), WsplexError::Internal(s2)) => s1 == s2,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for WsplexError {
    fn from(e: std::io::Error) -> Self {
        WsplexError::Io(Arc::new(e))
    }
}

impl From<tungstenite::Error> for WsplexError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                WsplexError::ConnectionClosed
            }
            tungstenite::Error::Io(io) => WsplexError::Io(Arc::new(io)),
            other => WsplexError::Protocol(other.to_string()),
        }
    }
}

impl From<uuid::Error> for WsplexError {
    fn from(e: uuid::Error) -> Self {
        WsplexError::InvalidSessionId(e.to_string())
    }
}
