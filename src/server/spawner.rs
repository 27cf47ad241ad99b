// src/server/spawner.rs

//! Spawns the dispatcher thread and all of the server's long-running tasks.

use super::context::ServerContext;
use super::{control_server, metrics_server};
use crate::core::ControlPlane;
use crate::core::Dispatcher;
use crate::core::tasks::memory_monitor::MemoryMonitorTask;
use crate::core::workers::{DeliveryQueue, WorkerPool, handler_for};
use anyhow::{Context, Result, anyhow};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::info;

/// Spawns all critical background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let server_state = ctx.state.clone();
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;
    let config = &server_state.config;

    // --- Workers ---
    let (queue, receivers) =
        DeliveryQueue::new(config.workers.count, config.workers.queue_capacity);
    WorkerPool::spawn(
        receivers,
        handler_for(config.workers.mode),
        ControlPlane::new(server_state.clone()),
        shutdown_tx,
        background_tasks,
    );

    // --- Dispatcher ---
    // Runs on its own OS thread: it blocks in the poller and on full queues.
    let dispatcher = Dispatcher::new(server_state.clone(), queue);
    let (done_tx, done_rx) = oneshot::channel();
    thread::Builder::new()
        .name("wsplex-dispatcher".to_string())
        .spawn(move || {
            let _ = done_tx.send(dispatcher.run());
        })
        .context("Failed to spawn the dispatcher thread")?;
    background_tasks.spawn(async move {
        match done_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("dispatcher failed: {e}")),
            Err(_) => Err(anyhow!("dispatcher thread panicked")),
        }
    });

    // --- Control Plane ---
    let control_listener = ctx
        .control_listener
        .take()
        .context("control listener already consumed")?;
    let control_state = server_state.clone();
    let shutdown_rx_control = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        control_server::run_control_server(control_listener, control_state, shutdown_rx_control)
            .await
    });

    // --- Metrics Server ---
    if let Some(metrics_listener) = ctx.metrics_listener.take() {
        let metrics_state = server_state.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_listener, metrics_state, shutdown_rx_metrics)
                .await
        });

        let monitor =
            MemoryMonitorTask::new(Duration::from_secs(config.metrics.memory_sample_secs));
        let shutdown_rx_memory = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            monitor.run(shutdown_rx_memory).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
