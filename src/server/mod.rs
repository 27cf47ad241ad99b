// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

mod connection_loop;
mod context;
mod control_server;
mod initialization;
mod metrics_server;
mod spawner;

pub use context::{ServerContext, WsServerState};
pub use control_server::{AnnounceResponse, StatsResponse, router as control_router};

/// The main server startup function: binds every listener, then serves until
/// SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let ctx = bind(config).await?;
    ctx.run_until(shutdown_signal()).await
}

/// Initializes server state and binds all listeners without serving yet.
pub async fn bind(config: Config) -> Result<ServerContext> {
    initialization::setup(config).await
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("SIGINT received, initiating graceful shutdown.");
            }
            return;
        }
    };
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for SIGINT: {}", e);
            }
            info!("SIGINT received, initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received, initiating graceful shutdown.");
        }
    }
}
