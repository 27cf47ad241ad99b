// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Gauges ---
    /// The number of connections currently held by the registry.
    pub static ref ACTIVE_CONNECTIONS: Gauge =
        register_gauge!("wsplex_active_connections", "Number of currently registered WebSocket connections.").unwrap();
    /// Resident memory of the server process, sampled periodically.
    pub static ref MEMORY_USAGE_BYTES: Gauge =
        register_gauge!("wsplex_memory_usage_bytes", "Resident memory of the server process in bytes.").unwrap();

    // --- Counters ---
    /// The total number of connections accepted and registered since startup.
    pub static ref CONNECTIONS_ACCEPTED_TOTAL: Counter =
        register_counter!("wsplex_connections_accepted_total", "Total number of connections registered.").unwrap();
    /// Connections refused because the server was at `max_clients`.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("wsplex_connections_rejected_total", "Total number of connections rejected at the client limit.").unwrap();
    pub static ref HANDSHAKE_FAILURES_TOTAL: Counter =
        register_counter!("wsplex_handshake_failures_total", "Total number of failed WebSocket upgrades.").unwrap();
    /// Connections torn down after an I/O error, a close, or shutdown.
    pub static ref CONNECTIONS_CLOSED_TOTAL: Counter =
        register_counter!("wsplex_connections_closed_total", "Total number of connections torn down.").unwrap();
    pub static ref MESSAGES_RECEIVED_TOTAL: Counter =
        register_counter!("wsplex_messages_received_total", "Total number of messages read by the dispatcher.").unwrap();
    pub static ref MESSAGES_SENT_TOTAL: Counter =
        register_counter!("wsplex_messages_sent_total", "Total number of messages written to connections.").unwrap();
    pub static ref WRITE_FAILURES_TOTAL: Counter =
        register_counter!("wsplex_write_failures_total", "Total number of failed writes to connections.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
