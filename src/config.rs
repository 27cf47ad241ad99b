// src/config.rs

//! Manages server configuration: loading, resolving defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::thread;
use tracing::warn;

/// Selects the application logic run by the message workers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Write every message back to the session that sent it.
    #[default]
    Echo,
    /// Log every message and reply with nothing.
    Log,
}

/// Settings for the readiness loop.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DispatcherConfig {
    /// The maximum number of ready descriptors collected per wait.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// How long a wait may block. Absent means block until readiness.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            wait_timeout_ms: None,
        }
    }
}

fn default_max_events() -> usize {
    100
}

/// Settings for the workers that run application logic off the poll thread.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkersConfig {
    /// Number of workers, and of delivery queue shards.
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Capacity of each shard. A full shard blocks the dispatcher.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub mode: WorkerMode,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            mode: WorkerMode::default(),
        }
    }
}

fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_queue_capacity() -> usize {
    1024
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    /// How often the process memory gauge is refreshed, in seconds.
    #[serde(default = "default_memory_sample_secs")]
    pub memory_sample_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            memory_sample_secs: default_memory_sample_secs(),
        }
    }
}

fn default_metrics_port() -> u16 {
    8878
}
fn default_memory_sample_secs() -> u64 {
    5
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_control_port")]
    control_port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_ws_path")]
    ws_path: String,
    #[serde(default = "default_handshake_timeout_ms")]
    handshake_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    write_timeout_ms: u64,
    #[serde(default)]
    dispatcher: DispatcherConfig,
    #[serde(default)]
    workers: WorkersConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_control_port() -> u16 {
    8081
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_handshake_timeout_ms() -> u64 {
    5000
}
fn default_write_timeout_ms() -> u64 {
    5000
}

/// Represents the final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    /// WebSocket listener port. `0` binds an ephemeral port.
    pub port: u16,
    /// HTTP control-plane port (`/announce`, `/push`, `/stats`). `0` binds an
    /// ephemeral port.
    pub control_port: u16,
    pub log_level: String,
    pub max_clients: usize,
    /// The only request path accepted for WebSocket upgrades.
    pub ws_path: String,
    pub handshake_timeout_ms: u64,
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            control_port: default_control_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            ws_path: default_ws_path(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            dispatcher: DispatcherConfig::default(),
            workers: WorkersConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            control_port: raw_config.control_port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            ws_path: raw_config.ws_path,
            handshake_timeout_ms: raw_config.handshake_timeout_ms,
            write_timeout_ms: raw_config.write_timeout_ms,
            dispatcher: raw_config.dispatcher,
            workers: raw_config.workers,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.port != 0 && self.port == self.control_port {
            return Err(anyhow!(
                "control_port cannot be the same as the WebSocket port"
            ));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if !self.ws_path.starts_with('/') {
            return Err(anyhow!("ws_path must start with '/'"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(anyhow!("handshake_timeout_ms cannot be 0"));
        }
        if self.write_timeout_ms == 0 {
            return Err(anyhow!("write_timeout_ms cannot be 0"));
        }
        if self.dispatcher.max_events == 0 {
            return Err(anyhow!("dispatcher.max_events cannot be 0"));
        }
        if self.dispatcher.max_events > i32::MAX as usize {
            return Err(anyhow!("dispatcher.max_events is too large"));
        }
        if self.dispatcher.wait_timeout_ms == Some(0) {
            warn!(
                "dispatcher.wait_timeout_ms is 0: the dispatcher will busy-poll and burn a CPU core."
            );
        }
        if self.workers.count == 0 {
            return Err(anyhow!("workers.count cannot be 0"));
        }
        if self.workers.queue_capacity == 0 {
            return Err(anyhow!("workers.queue_capacity cannot be 0"));
        }

        if self.metrics.enabled {
            if self.metrics.memory_sample_secs == 0 {
                return Err(anyhow!("metrics.memory_sample_secs cannot be 0"));
            }
            if self.metrics.port != 0
                && (self.metrics.port == self.port || self.metrics.port == self.control_port)
            {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the WebSocket or control port"
                ));
            }
        }
        Ok(())
    }
}
