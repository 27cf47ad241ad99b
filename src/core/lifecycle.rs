// src/core/lifecycle.rs

//! The single teardown path shared by the dispatcher, the control plane and
//! shutdown.

use super::metrics;
use super::state::ServerState;
use crate::connection::{Connection, MessageStream};
use std::sync::Arc;
use tracing::debug;

/// Tears a connection down: unregister from the poller, delete from the
/// registry, then close the socket.
///
/// Only the caller that wins the connection's Active→Closed transition runs
/// the sequence, so a connection racing between the dispatcher and a
/// broadcast is torn down exactly once. The socket is closed last, which
/// keeps its descriptor from being recycled by the OS while it is still
/// registered anywhere. Returns `false` if someone else already did it.
pub fn evict<S: MessageStream>(
    state: &ServerState<S>,
    connection: &Arc<Connection<S>>,
    reason: &str,
) -> bool {
    if !connection.begin_close() {
        return false;
    }

    if let Err(e) = state.poller.unregister(connection.descriptor()) {
        debug!(
            "Failed to unregister fd {} for session {}: {}",
            connection.descriptor(),
            connection.session_id(),
            e
        );
    }
    state.registry.delete(connection);
    connection.close_socket();

    metrics::CONNECTIONS_CLOSED_TOTAL.inc();
    debug!(
        "Session {} (fd {}) closed: {}",
        connection.session_id(),
        connection.descriptor(),
        reason
    );
    true
}
