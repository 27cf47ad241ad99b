// src/core/control.rs

//! Out-of-band writes to registered sessions: push to one, announce to all.
//!
//! Everything here goes through the registry's public lookups; the control
//! plane never touches the registry's lock or maps directly.

use super::errors::WsplexError;
use super::lifecycle;
use super::metrics;
use super::state::ServerState;
use crate::connection::{Connection, Message, MessageStream, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceReport {
    /// Number of connections the message was written to.
    pub delivered: usize,
    /// Sessions whose write failed; each was scheduled for removal.
    pub failed: Vec<SessionId>,
}

/// Push and broadcast operations over the shared registry.
pub struct ControlPlane<S> {
    state: Arc<ServerState<S>>,
}

impl<S> Clone for ControlPlane<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<S: MessageStream> ControlPlane<S> {
    pub fn new(state: Arc<ServerState<S>>) -> Self {
        Self { state }
    }

    /// Writes `message` to the session identified by `session_id`.
    ///
    /// An unknown session is reported as `SessionNotFound` and never retried.
    /// A failed write evicts the connection before the error is returned.
    pub fn push(&self, session_id: &str, message: Message) -> Result<(), WsplexError> {
        let connection = self
            .state
            .registry
            .get_by_session(session_id)
            .ok_or_else(|| WsplexError::SessionNotFound(session_id.to_string()))?;
        self.write(&connection, message)
    }

    /// Writes `message` to every live connection.
    ///
    /// The registry is snapshotted first and the lock released before any
    /// write. One failing connection never stops delivery to the rest.
    pub fn announce(&self, message: Message) -> AnnounceReport {
        let connections = self.state.registry.snapshot();
        let mut report = AnnounceReport::default();
        for connection in &connections {
            match self.write(connection, message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed.push(connection.session_id().clone()),
            }
        }
        debug!(
            "Announce finished: {} delivered, {} failed.",
            report.delivered,
            report.failed.len()
        );
        report
    }

    /// Runs `push` on the blocking pool.
    pub async fn push_async(&self, session_id: SessionId, message: Message) -> Result<(), WsplexError> {
        let control = self.clone();
        tokio::task::spawn_blocking(move || control.push(session_id.as_str(), message))
            .await
            .map_err(|e| WsplexError::Internal(format!("push task failed: {e}")))?
    }

    /// Runs `announce` on the blocking pool.
    pub async fn announce_async(&self, message: Message) -> Result<AnnounceReport, WsplexError> {
        let control = self.clone();
        tokio::task::spawn_blocking(move || control.announce(message))
            .await
            .map_err(|e| WsplexError::Internal(format!("announce task failed: {e}")))
    }

    fn write(&self, connection: &Arc<Connection<S>>, message: Message) -> Result<(), WsplexError> {
        let timeout = Duration::from_millis(self.state.config.write_timeout_ms);
        match connection.write_message(message, timeout) {
            Ok(()) => {
                self.state.stats.increment_messages_sent();
                metrics::MESSAGES_SENT_TOTAL.inc();
                Ok(())
            }
            Err(e) => {
                // `evict` is a no-op when a concurrent teardown already won.
                if lifecycle::evict(&self.state, connection, "write failure") {
                    metrics::WRITE_FAILURES_TOTAL.inc();
                    warn!(
                        "Write to session {} failed: {}",
                        connection.session_id(),
                        e
                    );
                }
                Err(e)
            }
        }
    }
}
