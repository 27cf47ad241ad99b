// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::WebSocket;
use wsplex::config::Config;
use wsplex::connection::{Message, MessageStream, SESSION_HEADER, SessionId, WriteStatus};
use wsplex::core::{ServerState, WsplexError};
use wsplex::server::{self, WsServerState};

/// Installs a quiet subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A newline-framed text stream over one end of a Unix socket pair.
///
/// Stands in for a WebSocket so the registry, poller and dispatcher can be
/// driven without a handshake.
pub struct LineStream {
    inner: UnixStream,
    buffer: Vec<u8>,
    outbound: Vec<u8>,
    closed: Arc<AtomicBool>,
}

impl LineStream {
    /// Returns the server-side stream and the blocking peer end.
    pub fn pair() -> (Self, UnixStream) {
        let (server, peer) = UnixStream::pair().expect("socketpair");
        server.set_nonblocking(true).expect("nonblocking");
        peer.set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        (
            Self {
                inner: server,
                buffer: Vec::new(),
                outbound: Vec::new(),
                closed: Arc::new(AtomicBool::new(false)),
            },
            peer,
        )
    }

    /// A flag that flips once `close` has run on this stream.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    fn take_line(&mut self) -> Option<Message> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(Message::Text(
            String::from_utf8_lossy(&line[..line.len() - 1]).into_owned(),
        ))
    }
}

impl MessageStream for LineStream {
    fn descriptor(&self) -> RawFd {
        self.inner.as_raw_fd()
    }

    fn read_message(&mut self) -> Result<Option<Message>, WsplexError> {
        loop {
            if let Some(message) = self.take_line() {
                return Ok(Some(message));
            }
            let mut chunk = [0u8; 4096];
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(WsplexError::ConnectionClosed),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_message(&mut self, message: Message) -> Result<WriteStatus, WsplexError> {
        self.outbound.extend_from_slice(message.as_bytes());
        self.outbound.push(b'\n');
        self.flush()
    }

    fn flush(&mut self) -> Result<WriteStatus, WsplexError> {
        while !self.outbound.is_empty() {
            match self.inner.write(&self.outbound) {
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(WriteStatus::Pending),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(WriteStatus::Flushed)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.inner.shutdown(Shutdown::Both);
    }
}

/// A stream whose writes always fail. Reads report nothing pending.
pub struct BrokenStream {
    descriptor: RawFd,
    closed: Arc<AtomicBool>,
}

impl BrokenStream {
    pub fn new(descriptor: RawFd) -> Self {
        Self {
            descriptor,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl MessageStream for BrokenStream {
    fn descriptor(&self) -> RawFd {
        self.descriptor
    }

    fn read_message(&mut self) -> Result<Option<Message>, WsplexError> {
        Ok(None)
    }

    fn write_message(&mut self, _message: Message) -> Result<WriteStatus, WsplexError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<WriteStatus, WsplexError> {
        Err(std::io::Error::new(ErrorKind::BrokenPipe, "broken pipe").into())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Shared state over an in-process stream type, with no listeners.
pub fn test_state<S>() -> Arc<ServerState<S>> {
    init_tracing();
    ServerState::initialize(test_config()).expect("Failed to initialize server state")
}

/// A config bound to ephemeral ports with a small worker pool.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.port = 0;
    config.control_port = 0;
    config.workers.count = 2;
    config.handshake_timeout_ms = 2000;
    config.write_timeout_ms = 2000;
    config
}

/// Reads one newline-terminated line from a blocking peer.
pub fn read_line(peer: &mut UnixStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = peer.read(&mut byte).expect("peer read");
        assert!(n > 0, "peer closed before a full line arrived");
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    String::from_utf8(line).expect("utf-8 line")
}

/// A full server running on ephemeral ports inside the test runtime.
pub struct TestServer {
    pub ws_addr: SocketAddr,
    pub control_addr: SocketAddr,
    pub state: Arc<WsServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        init_tracing();
        let ctx = server::bind(config).await.expect("Failed to bind server");
        let ws_addr = ctx.ws_addr().expect("ws addr");
        let control_addr = ctx.control_addr().expect("control addr");
        let state = ctx.state();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(ctx.run_until(async move {
            let _ = shutdown_rx.await;
        }));
        Self {
            ws_addr,
            control_addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.ws_addr, self.state.config.ws_path)
    }

    pub fn control_url(&self, path: &str) -> String {
        format!("http://{}{}", self.control_addr, path)
    }

    /// Polls until the registry holds `expected` connections.
    pub async fn wait_for_connections(&self, expected: usize) {
        for _ in 0..200 {
            if self.state.registry.len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} connections, registry holds {}",
            expected,
            self.state.registry.len()
        );
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .expect("server task panicked")
                .expect("server returned an error");
        }
    }
}

pub type Client = WebSocket<MaybeTlsStream<TcpStream>>;

/// Opens a blocking WebSocket client and returns it with its session id.
pub fn connect(url: &str) -> (Client, SessionId) {
    let (client, response) = tungstenite::connect(url).expect("WebSocket connect");
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(SessionId::from)
        .expect("session id header");
    if let MaybeTlsStream::Plain(stream) = client.get_ref() {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("client read timeout");
    }
    (client, session_id)
}

/// Reads the next text message, skipping control frames.
pub fn read_text(client: &mut Client) -> String {
    loop {
        match client.read().expect("client read") {
            tungstenite::Message::Text(text) => return text.as_str().to_owned(),
            tungstenite::Message::Binary(_) => panic!("expected a text message"),
            _ => continue,
        }
    }
}
