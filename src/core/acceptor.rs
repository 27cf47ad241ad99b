// src/core/acceptor.rs

//! Admits a handshaken stream into the registry and the poller.

use super::errors::WsplexError;
use super::lifecycle;
use super::metrics;
use super::state::ServerState;
use crate::connection::{Connection, MessageStream, SessionId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registers upgraded sessions with the shared state.
pub struct SessionAcceptor<S> {
    state: Arc<ServerState<S>>,
}

impl<S> Clone for SessionAcceptor<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<S: MessageStream> SessionAcceptor<S> {
    pub fn new(state: Arc<ServerState<S>>) -> Self {
        Self { state }
    }

    /// Adds the stream to the registry, then to the poller.
    ///
    /// If the poller refuses the descriptor the registry entry is rolled back
    /// and the stream closed, so no connection is ever registered without
    /// readiness notifications. A rejected duplicate drops the stream.
    ///
    /// A stream that finishes its handshake after shutdown began is closed
    /// instead of registered. The flag is checked again once the entry is in
    /// the registry: shutdown sets it before snapshotting the registry, so
    /// either the shutdown sweep sees the entry or this check sees the flag.
    pub fn admit(&self, session_id: SessionId, mut stream: S) -> Result<Arc<Connection<S>>, WsplexError> {
        if self.state.is_shutting_down() {
            stream.close();
            return Err(WsplexError::ShuttingDown);
        }

        let descriptor = stream.descriptor();
        let connection = self.state.registry.add(session_id, descriptor, stream)?;

        if let Err(e) = self.state.poller.register(descriptor) {
            warn!(
                "Failed to register fd {} for session {}: {}",
                descriptor,
                connection.session_id(),
                e
            );
            if connection.begin_close() {
                self.state.registry.delete(&connection);
                connection.close_socket();
            }
            return Err(e);
        }

        if self.state.is_shutting_down() {
            lifecycle::evict(&self.state, &connection, "server shutdown");
            return Err(WsplexError::ShuttingDown);
        }

        self.state.stats.increment_total_connections();
        metrics::CONNECTIONS_ACCEPTED_TOTAL.inc();
        debug!(
            "Session {} registered on fd {}.",
            connection.session_id(),
            descriptor
        );
        Ok(connection)
    }
}
