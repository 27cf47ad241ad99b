// src/server/metrics_server.rs

use super::context::WsServerState;
use crate::core::metrics::{self, gather_metrics};
use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Handles HTTP requests to the /metrics endpoint.
///
/// The connection gauge is refreshed from the registry before gathering, so a
/// scrape never reports a stale count.
async fn metrics_handler(state: Arc<WsServerState>) -> impl IntoResponse {
    metrics::ACTIVE_CONNECTIONS.set(state.registry.len() as f64);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Runs a simple HTTP server to expose Prometheus metrics on /metrics.
pub async fn run_metrics_server(
    listener: TcpListener,
    state: Arc<WsServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await
        .context("metrics server failed")
}
