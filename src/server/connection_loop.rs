// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::{ServerContext, WsServerState};
use crate::connection::{SessionId, WsOptions, WsStream};
use crate::core::{SessionAcceptor, WsplexError, lifecycle, metrics};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run<F>(mut ctx: ServerContext, shutdown: F)
where
    F: Future<Output = ()> + Send,
{
    let acceptor = SessionAcceptor::new(ctx.state.clone());
    let options = Arc::new(WsOptions::from_config(&ctx.state.config));
    let mut handshakes = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.ws_listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        if ctx.state.registry.len() >= ctx.state.config.max_clients {
                            warn!("Rejecting connection from {}: max_clients ({}) reached.", addr, ctx.state.config.max_clients);
                            metrics::CONNECTIONS_REJECTED_TOTAL.inc();
                            drop(socket);
                            continue;
                        }
                        let acceptor = acceptor.clone();
                        let options = options.clone();
                        handshakes.spawn(upgrade(socket, addr, acceptor, options));
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            Some(res) = handshakes.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A handshake task panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    ctx.state.begin_shutdown();
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    handshakes.shutdown().await;
    close_all(&ctx.state);

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
}

/// Upgrades one accepted socket and admits it into the registry and poller.
///
/// The handshake is blocking I/O bounded by `handshake_timeout_ms`, so it runs
/// on the blocking pool.
async fn upgrade(
    socket: TcpStream,
    addr: SocketAddr,
    acceptor: SessionAcceptor<WsStream>,
    options: Arc<WsOptions>,
) {
    let socket = match socket.into_std() {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to detach socket from {}: {}", addr, e);
            return;
        }
    };

    let result = tokio::task::spawn_blocking(move || {
        let session_id = SessionId::generate();
        let stream = WsStream::accept(socket, &options, &session_id)?;
        acceptor.admit(session_id, stream)
    })
    .await;

    match result {
        Ok(Ok(connection)) => debug!(
            "Accepted session {} from {}.",
            connection.session_id(),
            addr
        ),
        Ok(Err(WsplexError::Handshake(e))) => {
            metrics::HANDSHAKE_FAILURES_TOTAL.inc();
            debug!("WebSocket handshake with {} failed: {}", addr, e);
        }
        Ok(Err(WsplexError::ShuttingDown)) => {
            debug!("Dropped session from {} during shutdown.", addr)
        }
        Ok(Err(e)) => warn!("Failed to admit connection from {}: {}", addr, e),
        Err(e) => error!("Handshake task for {} failed: {e:?}", addr),
    }
}

fn close_all(state: &WsServerState) {
    let connections = state.registry.snapshot();
    let mut closed = 0;
    for connection in &connections {
        if lifecycle::evict(state, connection, "server shutdown") {
            closed += 1;
        }
    }
    info!("Closed {} client connections.", closed);
}
