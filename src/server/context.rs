// src/server/context.rs

use super::{connection_loop, spawner};
use crate::connection::WsStream;
use crate::core::state::ServerState;
use anyhow::Result;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// The shared state of a server speaking WebSocket over TCP.
pub type WsServerState = ServerState<WsStream>;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<WsServerState>,
    pub ws_listener: TcpListener,
    pub control_listener: Option<TcpListener>,
    pub metrics_listener: Option<TcpListener>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}

impl ServerContext {
    /// The address the WebSocket listener is bound to.
    pub fn ws_addr(&self) -> io::Result<SocketAddr> {
        self.ws_listener.local_addr()
    }

    /// The address the HTTP control plane is bound to.
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    pub fn state(&self) -> Arc<WsServerState> {
        self.state.clone()
    }

    /// Spawns the dispatcher and background tasks, then accepts connections
    /// until `shutdown` completes or a critical task fails.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        spawner::spawn_all(&mut self)?;
        connection_loop::run(self, shutdown).await;
        Ok(())
    }
}
