// src/core/workers.rs

//! The bounded hand-off between the dispatcher thread and the application.
//!
//! The dispatcher never runs application logic itself. Every message it reads
//! is pushed into a bounded queue shard chosen by the connection's
//! descriptor, so one session's messages always reach the same worker in
//! order. A full shard blocks the dispatcher: that is the server's single
//! explicit backpressure point.

use super::control::ControlPlane;
use super::errors::WsplexError;
use crate::config::WorkerMode;
use crate::connection::{Message, MessageStream, SessionId};
use async_trait::async_trait;
use std::os::fd::RawFd;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// One message read from one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub session_id: SessionId,
    pub message: Message,
}

/// The sending half of the sharded delivery queue, owned by the dispatcher.
#[derive(Clone)]
pub struct DeliveryQueue {
    shards: Vec<mpsc::Sender<Delivery>>,
}

impl DeliveryQueue {
    /// Creates `shards` bounded channels of `capacity` entries each and
    /// returns the receivers for the workers.
    pub fn new(shards: usize, capacity: usize) -> (Self, Vec<mpsc::Receiver<Delivery>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..shards.max(1))
            .map(|_| mpsc::channel(capacity.max(1)))
            .unzip();
        (Self { shards: senders }, receivers)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Queues a delivery, blocking the calling thread while the shard is full.
    ///
    /// Must only be called from a thread outside the async runtime.
    pub fn send_blocking(&self, descriptor: RawFd, delivery: Delivery) -> Result<(), WsplexError> {
        let shard = descriptor.unsigned_abs() as usize % self.shards.len();
        self.shards[shard]
            .blocking_send(delivery)
            .map_err(|_| WsplexError::QueueClosed)
    }
}

/// Application logic run for each message read from a session.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles one message. A returned message is written back to the same
    /// session.
    async fn handle(&self, session_id: &SessionId, message: Message) -> Option<Message>;
}

/// Writes every message straight back to its sender.
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, _session_id: &SessionId, message: Message) -> Option<Message> {
        Some(message)
    }
}

/// Logs every message and replies with nothing.
pub struct LogHandler;

#[async_trait]
impl MessageHandler for LogHandler {
    async fn handle(&self, session_id: &SessionId, message: Message) -> Option<Message> {
        match &message {
            Message::Text(text) => info!("session {}: {}", session_id, text),
            Message::Binary(data) => info!("session {}: <{} bytes>", session_id, data.len()),
        }
        None
    }
}

/// Builds the handler selected by `workers.mode`.
pub fn handler_for(mode: WorkerMode) -> Arc<dyn MessageHandler> {
    match mode {
        WorkerMode::Echo => Arc::new(EchoHandler),
        WorkerMode::Log => Arc::new(LogHandler),
    }
}

/// Spawns one async worker per delivery queue shard.
pub struct WorkerPool;

impl WorkerPool {
    pub fn spawn<S: MessageStream>(
        receivers: Vec<mpsc::Receiver<Delivery>>,
        handler: Arc<dyn MessageHandler>,
        control: ControlPlane<S>,
        shutdown_tx: &broadcast::Sender<()>,
        tasks: &mut JoinSet<anyhow::Result<()>>,
    ) {
        let count = receivers.len();
        for (id, rx) in receivers.into_iter().enumerate() {
            let handler = handler.clone();
            let control = control.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            tasks.spawn(async move {
                run_worker(id, rx, handler, control, shutdown_rx).await;
                Ok(())
            });
        }
        info!("Spawned {} message workers.", count);
    }
}

async fn run_worker<S: MessageStream>(
    id: usize,
    mut rx: mpsc::Receiver<Delivery>,
    handler: Arc<dyn MessageHandler>,
    control: ControlPlane<S>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            next = rx.recv() => {
                let Some(delivery) = next else { break };
                let Some(reply) = handler.handle(&delivery.session_id, delivery.message).await else {
                    continue;
                };
                match control.push_async(delivery.session_id.clone(), reply).await {
                    Ok(()) => {}
                    Err(WsplexError::SessionNotFound(_)) | Err(WsplexError::ConnectionClosed) => {
                        debug!("Reply dropped, session {} is gone.", delivery.session_id);
                    }
                    Err(e) => warn!("Reply to session {} failed: {}", delivery.session_id, e),
                }
            }
        }
    }
    debug!("Worker {} stopped.", id);
}
