// src/server/initialization.rs

//! Handles server initialization: shared state setup and listener binding.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = ServerState::initialize(config.clone())
        .context("CRITICAL: Failed to create the readiness poller")?;
    info!("Server state initialized.");

    let ws_listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind WebSocket port {}", config.port))?;
    info!(
        "WebSocket endpoint listening on ws://{}{}",
        ws_listener.local_addr()?,
        config.ws_path
    );

    let control_listener = TcpListener::bind((config.host.as_str(), config.control_port))
        .await
        .with_context(|| format!("Failed to bind control port {}", config.control_port))?;
    info!(
        "Control plane listening on http://{}",
        control_listener.local_addr()?
    );

    let metrics_listener = if config.metrics.enabled {
        let listener = TcpListener::bind(("0.0.0.0", config.metrics.port))
            .await
            .with_context(|| format!("Failed to bind metrics port {}", config.metrics.port))?;
        info!(
            "Prometheus metrics server listening on http://{}/metrics",
            listener.local_addr()?
        );
        Some(listener)
    } else {
        None
    };

    Ok(ServerContext {
        state,
        ws_listener,
        control_listener: Some(control_listener),
        metrics_listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Accepting up to {} clients on path '{}'.",
        config.max_clients, config.ws_path
    );
    info!(
        "Dispatcher collects up to {} events per wait; {} workers in '{:?}' mode, {} queued messages each.",
        config.dispatcher.max_events,
        config.workers.count,
        config.workers.mode,
        config.workers.queue_capacity
    );
    if config.host != "127.0.0.1" && config.host != "localhost" {
        warn!(
            "WARNING: The control plane on port {} is unauthenticated and bound to '{}'.",
            config.control_port, config.host
        );
    }
}
