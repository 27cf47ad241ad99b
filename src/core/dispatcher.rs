// src/core/dispatcher.rs

//! The readiness-driven read loop.
//!
//! A single `Dispatcher` runs on one dedicated thread and owns every read on
//! every registered connection. It waits on the poller, maps each ready
//! descriptor back to its connection, drains the complete messages the socket
//! holds, and either hands them to the workers or tears the connection down.

use super::errors::WsplexError;
use super::lifecycle;
use super::metrics;
use super::poller::ReadinessBatch;
use super::state::ServerState;
use super::workers::{Delivery, DeliveryQueue};
use crate::connection::{Connection, MessageStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Messages read from one connection per pass. A connection with more input
/// is carried over and serviced again on the next pass.
pub const READ_BUDGET: usize = 64;

pub struct Dispatcher<S> {
    state: Arc<ServerState<S>>,
    queue: DeliveryQueue,
    batch: ReadinessBatch,
    timeout: Option<Duration>,
    backlog: Vec<Arc<Connection<S>>>,
}

impl<S: MessageStream> Dispatcher<S> {
    /// Creates a dispatcher using the `[dispatcher]` section of the config.
    pub fn new(state: Arc<ServerState<S>>, queue: DeliveryQueue) -> Self {
        let max_events = state.config.dispatcher.max_events;
        let timeout = state
            .config
            .dispatcher
            .wait_timeout_ms
            .map(Duration::from_millis);
        Self::with_limits(state, queue, max_events, timeout)
    }

    pub fn with_limits(
        state: Arc<ServerState<S>>,
        queue: DeliveryQueue,
        max_events: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            state,
            queue,
            batch: ReadinessBatch::with_capacity(max_events),
            timeout,
            backlog: Vec::new(),
        }
    }

    /// Runs until shutdown is requested or every worker is gone.
    ///
    /// Interrupted waits are retried silently. Resource exhaustion and a
    /// broken poller are returned, so the supervisor can treat them as a
    /// liveness failure instead of this loop spinning on a permanent error.
    pub fn run(mut self) -> Result<(), WsplexError> {
        info!(
            "Dispatcher started (max_events={}, timeout={:?}, workers={}).",
            self.batch.capacity(),
            self.timeout,
            self.queue.shard_count()
        );
        while !self.state.is_shutting_down() {
            match self.run_once() {
                Ok(_) => {}
                Err(WsplexError::Interrupted) => continue,
                Err(WsplexError::QueueClosed) => {
                    info!("Delivery queue closed, dispatcher stopping.");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    error!("CRITICAL: Dispatcher cannot wait for readiness: {}", e);
                    return Err(e);
                }
                Err(e) => warn!("Dispatcher iteration failed: {}", e),
            }
        }
        info!("Dispatcher stopped.");
        Ok(())
    }

    /// Performs one wait and services every ready connection. Returns the
    /// number of messages handed to the workers.
    ///
    /// Connections left over from the previous pass are serviced first, and
    /// while any exist the wait does not block.
    pub fn run_once(&mut self) -> Result<usize, WsplexError> {
        let timeout = if self.backlog.is_empty() {
            self.timeout
        } else {
            Some(Duration::ZERO)
        };
        self.state.poller.wait(&mut self.batch, timeout)?;
        if self.batch.woken() {
            trace!("Dispatcher woken.");
        }

        let mut delivered = 0;
        for connection in std::mem::take(&mut self.backlog) {
            if !connection.is_active() {
                continue;
            }
            let (count, exhausted) = self.service(&connection)?;
            delivered += count;
            if exhausted {
                self.backlog.push(connection);
            }
        }

        for readiness in self.batch.iter() {
            let Some(connection) = self.state.registry.get_by_descriptor(readiness.descriptor)
            else {
                // Stale event for a connection that was already removed.
                trace!("No connection for ready fd {}.", readiness.descriptor);
                continue;
            };
            let (count, exhausted) = self.service(&connection)?;
            delivered += count;
            if exhausted && !self.backlog.iter().any(|c| Arc::ptr_eq(c, &connection)) {
                self.backlog.push(connection);
            }
        }
        Ok(delivered)
    }

    /// Drains complete messages from one connection, up to `READ_BUDGET`.
    ///
    /// Readiness is edge-triggered and the codec may pull several frames out
    /// of the kernel in one read, so a connection is read until it reports
    /// nothing pending. Returns the count and whether the budget ran out
    /// first, in which case the caller carries the connection over.
    fn service(&self, connection: &Arc<Connection<S>>) -> Result<(usize, bool), WsplexError> {
        let mut delivered = 0;
        while delivered < READ_BUDGET {
            match connection.read_message() {
                Ok(Some(message)) => {
                    self.state.stats.increment_messages_received();
                    metrics::MESSAGES_RECEIVED_TOTAL.inc();
                    self.queue.send_blocking(
                        connection.descriptor(),
                        Delivery {
                            session_id: connection.session_id().clone(),
                            message,
                        },
                    )?;
                    delivered += 1;
                }
                Ok(None) => return Ok((delivered, false)),
                Err(e) => {
                    match &e {
                        WsplexError::ConnectionClosed => {
                            debug!("Session {} closed by peer.", connection.session_id())
                        }
                        _ => debug!(
                            "Read from session {} failed: {}",
                            connection.session_id(),
                            e
                        ),
                    }
                    lifecycle::evict(&self.state, connection, "read failure");
                    return Ok((delivered, false));
                }
            }
        }
        trace!(
            "Session {} used its read budget, carrying it over.",
            connection.session_id()
        );
        Ok((delivered, true))
    }
}
