// src/core/registry.rs

//! The bidirectional index of live connections: session id ↔ descriptor ↔
//! `Connection`.
//!
//! Both maps sit behind one `RwLock` so that no observer can ever see an
//! entry present under one key and missing under the other. Lookups and
//! snapshots take the shared lock; `add` and `delete` take the exclusive one.
//! No I/O is ever performed while the lock is held.

use super::errors::WsplexError;
use super::metrics;
use crate::connection::{Connection, SessionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;
use tracing::{debug, info};

/// Size changes are logged once every this many connections.
const LOG_EVERY: usize = 100;

struct Inner<S> {
    by_session: HashMap<SessionId, Arc<Connection<S>>>,
    by_descriptor: HashMap<RawFd, Arc<Connection<S>>>,
}

/// A thread-safe registry of live connections, addressable by session id or
/// by OS descriptor in O(1).
pub struct ConnectionRegistry<S> {
    inner: RwLock<Inner<S>>,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_session: HashMap::new(),
                by_descriptor: HashMap::new(),
            }),
        }
    }

    /// Inserts a new connection under both keys.
    ///
    /// Duplicate registrations are rejected: if either the session id or the
    /// descriptor is already present, nothing is inserted and the socket is
    /// dropped. Shadowing a live connection silently would leave the older
    /// one unreachable but still open.
    pub fn add(
        &self,
        session_id: SessionId,
        descriptor: RawFd,
        socket: S,
    ) -> Result<Arc<Connection<S>>, WsplexError> {
        let mut inner = self.inner.write();
        if inner.by_session.contains_key(&session_id) {
            return Err(WsplexError::AlreadyRegistered(format!(
                "session {session_id}"
            )));
        }
        if inner.by_descriptor.contains_key(&descriptor) {
            return Err(WsplexError::AlreadyRegistered(format!(
                "descriptor {descriptor}"
            )));
        }

        let connection = Arc::new(Connection::new(session_id.clone(), descriptor, socket));
        inner.by_session.insert(session_id, connection.clone());
        inner.by_descriptor.insert(descriptor, connection.clone());
        let total = inner.by_session.len();
        drop(inner);

        metrics::ACTIVE_CONNECTIONS.set(total as f64);
        if total % LOG_EVERY == 0 {
            info!("Total number of connections: {}", total);
        }
        Ok(connection)
    }

    pub fn get_by_session(&self, session_id: &str) -> Option<Arc<Connection<S>>> {
        self.inner.read().by_session.get(session_id).cloned()
    }

    pub fn get_by_descriptor(&self, descriptor: RawFd) -> Option<Arc<Connection<S>>> {
        self.inner.read().by_descriptor.get(&descriptor).cloned()
    }

    /// Removes this exact connection instance from both maps.
    ///
    /// A key is only removed while it still points at `connection`, so a
    /// newer connection that reused the descriptor is never touched. Calling
    /// this on an absent connection is a no-op. Returns whether anything was
    /// removed.
    pub fn delete(&self, connection: &Arc<Connection<S>>) -> bool {
        let mut inner = self.inner.write();
        let mut removed = false;

        if inner
            .by_session
            .get(connection.session_id())
            .is_some_and(|current| Arc::ptr_eq(current, connection))
        {
            inner.by_session.remove(connection.session_id());
            removed = true;
        }
        if inner
            .by_descriptor
            .get(&connection.descriptor())
            .is_some_and(|current| Arc::ptr_eq(current, connection))
        {
            inner.by_descriptor.remove(&connection.descriptor());
            removed = true;
        }
        let total = inner.by_session.len();
        drop(inner);

        if removed {
            metrics::ACTIVE_CONNECTIONS.set(total as f64);
            debug!(
                "Removed session {} (fd {}) from registry.",
                connection.session_id(),
                connection.descriptor()
            );
            if total % LOG_EVERY == 0 {
                info!("Total number of connections: {}", total);
            }
        }
        removed
    }

    /// Returns a point-in-time copy of all live connections.
    ///
    /// The lock is released before this returns, so callers may perform slow
    /// network writes on the result without blocking the registry.
    pub fn snapshot(&self) -> Vec<Arc<Connection<S>>> {
        self.inner.read().by_session.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_session.is_empty()
    }
}
