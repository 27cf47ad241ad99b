// src/server/control_server.rs

//! The HTTP control plane: broadcast to every session, push to one, and
//! read server counters.

use super::context::WsServerState;
use crate::connection::{Message, SessionId, WsStream};
use crate::core::{ControlPlane, WsplexError};
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Clone)]
struct ControlContext {
    state: Arc<WsServerState>,
    control: ControlPlane<WsStream>,
}

#[derive(Debug, Deserialize)]
pub struct PushParams {
    #[serde(rename = "sessionID")]
    session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsResponse {
    pub connections: usize,
    pub total_connections: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
}

/// Builds the control-plane routes over the given server state.
pub fn router(state: Arc<WsServerState>) -> Router {
    let ctx = ControlContext {
        control: ControlPlane::new(state.clone()),
        state,
    };
    Router::new()
        .route("/announce", post(announce_handler))
        .route("/push", post(push_handler))
        .route("/stats", get(stats_handler))
        .with_state(ctx)
}

/// Serves the control plane until the shutdown signal fires.
pub async fn run_control_server(
    listener: TcpListener,
    state: Arc<WsServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Control plane shutting down.");
        })
        .await
        .context("control plane server failed")
}

async fn announce_handler(State(ctx): State<ControlContext>, body: Bytes) -> Response {
    let Ok(text) = String::from_utf8(body.to_vec()) else {
        return (StatusCode::BAD_REQUEST, "body must be valid UTF-8").into_response();
    };
    match ctx.control.announce_async(Message::Text(text)).await {
        Ok(report) => Json(AnnounceResponse {
            delivered: report.delivered,
            failed: report.failed.len(),
        })
        .into_response(),
        Err(e) => {
            warn!("Announce failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn push_handler(
    State(ctx): State<ControlContext>,
    Query(params): Query<PushParams>,
    body: Bytes,
) -> Response {
    let Some(raw) = params.session_id else {
        return (StatusCode::BAD_REQUEST, "missing sessionID").into_response();
    };
    let session_id = match SessionId::parse_untrusted(&raw) {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let Ok(text) = String::from_utf8(body.to_vec()) else {
        return (StatusCode::BAD_REQUEST, "body must be valid UTF-8").into_response();
    };

    match ctx.control.push_async(session_id, Message::Text(text)).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        // A connection closed mid-push is as gone as one never registered.
        Err(WsplexError::SessionNotFound(_)) | Err(WsplexError::ConnectionClosed) => {
            (StatusCode::NOT_FOUND, "session not found").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn stats_handler(State(ctx): State<ControlContext>) -> Json<StatsResponse> {
    let stats = &ctx.state.stats;
    Json(StatsResponse {
        connections: ctx.state.registry.len(),
        total_connections: stats.get_total_connections(),
        messages_received: stats.get_messages_received(),
        messages_sent: stats.get_messages_sent(),
    })
}
