// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::WsplexError;
use crate::core::poller::Poller;
use crate::core::registry::ConnectionRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// The central struct holding all shared, server-wide state.
///
/// It is built once at startup and passed by `Arc` to the acceptor, the
/// dispatcher, the workers and the control plane. Nothing in the crate keeps
/// the registry or the poller in a global.
pub struct ServerState<S> {
    /// The validated configuration the server was started with.
    pub config: Config,
    /// The session id ↔ descriptor ↔ connection index.
    pub registry: ConnectionRegistry<S>,
    /// The readiness multiplexer shared by every connection.
    pub poller: Poller,
    /// Server-wide counters.
    pub stats: StatsState,
    shutting_down: AtomicBool,
}

impl<S> ServerState<S> {
    /// Creates the shared state. Failing to allocate the poller is fatal.
    pub fn initialize(config: Config) -> Result<Arc<Self>, WsplexError> {
        let poller = Poller::new()?;
        info!("Readiness poller created.");
        Ok(Arc::new(Self {
            config,
            registry: ConnectionRegistry::new(),
            poller,
            stats: StatsState::new(),
            shutting_down: AtomicBool::new(false),
        }))
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Flags the server as stopping and wakes the dispatcher out of its wait.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        if let Err(e) = self.poller.wake() {
            warn!("Failed to wake the dispatcher for shutdown: {}", e);
        }
    }
}
