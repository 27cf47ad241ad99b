// src/connection/ws.rs

//! `WsStream`: the production `MessageStream`, a non-blocking TCP socket
//! framed by `tungstenite`.

use super::session::SessionId;
use super::stream::{Message, MessageStream, WriteStatus};
use crate::config::Config;
use crate::core::WsplexError;
use std::io::ErrorKind;
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::{HeaderValue, StatusCode};
use tungstenite::{WebSocket, accept_hdr};

/// Response header carrying the session id assigned to the client.
pub const SESSION_HEADER: &str = "x-session-id";

/// Socket-level settings applied to every accepted WebSocket.
#[derive(Debug, Clone)]
pub struct WsOptions {
    /// The only request path accepted for upgrades.
    pub path: String,
    pub handshake_timeout: Duration,
}

impl WsOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.ws_path.clone(),
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
        }
    }
}

/// A server-side WebSocket over a non-blocking `TcpStream`.
pub struct WsStream {
    ws: WebSocket<TcpStream>,
    descriptor: RawFd,
}

impl WsStream {
    /// Runs the upgrade handshake on a freshly accepted socket.
    ///
    /// The handshake itself runs in blocking mode bounded by the handshake
    /// timeout; afterwards the socket is switched to non-blocking mode so the
    /// dispatcher can drain it without stalling.
    pub fn accept(
        stream: TcpStream,
        options: &WsOptions,
        session_id: &SessionId,
    ) -> Result<Self, WsplexError> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(options.handshake_timeout))?;
        stream.set_write_timeout(Some(options.handshake_timeout))?;
        let descriptor = stream.as_raw_fd();

        let expected_path = options.path.clone();
        let session_header = HeaderValue::from_str(session_id.as_str())
            .map_err(|e| WsplexError::Internal(format!("session id is not a header value: {e}")))?;

        let callback = move |request: &Request,
                             mut response: Response|
              -> Result<Response, ErrorResponse> {
            if request.uri().path() != expected_path {
                let mut rejection = ErrorResponse::new(Some("not found".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                return Err(rejection);
            }
            response
                .headers_mut()
                .insert(SESSION_HEADER, session_header);
            Ok(response)
        };

        let ws = accept_hdr(stream, callback).map_err(|e| WsplexError::Handshake(e.to_string()))?;

        let socket = ws.get_ref();
        socket.set_read_timeout(None)?;
        socket.set_write_timeout(None)?;
        socket.set_nonblocking(true)?;
        let _ = socket.set_nodelay(true);

        Ok(Self { ws, descriptor })
    }
}

impl MessageStream for WsStream {
    fn descriptor(&self) -> RawFd {
        self.descriptor
    }

    fn read_message(&mut self) -> Result<Option<Message>, WsplexError> {
        loop {
            match self.ws.read() {
                Ok(tungstenite::Message::Text(text)) => {
                    return Ok(Some(Message::Text(text.as_str().to_owned())));
                }
                Ok(tungstenite::Message::Binary(data)) => return Ok(Some(Message::Binary(data))),
                Ok(tungstenite::Message::Close(_)) => return Err(WsplexError::ConnectionClosed),
                // Ping, pong and raw frames: the codec queues any reply itself.
                Ok(_) => continue,
                Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_message(&mut self, message: Message) -> Result<WriteStatus, WsplexError> {
        let frame = match message {
            Message::Text(text) => tungstenite::Message::text(text),
            Message::Binary(data) => tungstenite::Message::binary(data),
        };
        // On `WouldBlock` the frame is already queued in the codec.
        write_status(self.ws.send(frame))
    }

    fn flush(&mut self) -> Result<WriteStatus, WsplexError> {
        write_status(self.ws.flush())
    }

    fn close(&mut self) {
        if self.ws.can_write() {
            let _ = self.ws.close(None);
            let _ = self.ws.flush();
        }
        let _ = self.ws.get_ref().shutdown(Shutdown::Both);
    }
}

fn write_status(result: Result<(), tungstenite::Error>) -> Result<WriteStatus, WsplexError> {
    match result {
        Ok(()) => Ok(WriteStatus::Flushed),
        Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
            Ok(WriteStatus::Pending)
        }
        Err(e) => Err(e.into()),
    }
}
