// src/core/tasks/memory_monitor.rs

use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::metrics;

/// Periodically samples the resident memory of the server process into the
/// `wsplex_memory_usage_bytes` gauge.
pub struct MemoryMonitorTask {
    interval: Duration,
}

impl MemoryMonitorTask {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                warn!("Memory monitor disabled, cannot resolve own pid: {}", e);
                return;
            }
        };
        info!("Memory monitor task started.");
        let mut system = System::new();
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(bytes) = sample(&mut system, pid) {
                        metrics::MEMORY_USAGE_BYTES.set(bytes as f64);
                        debug!("Process memory: {} bytes", bytes);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Memory monitor task shutting down.");
                    return;
                }
            }
        }
    }
}

/// Returns the resident memory of `pid` in bytes.
pub fn sample(system: &mut System, pid: Pid) -> Option<u64> {
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}
