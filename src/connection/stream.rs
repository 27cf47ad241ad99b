// src/connection/stream.rs

//! The capability the core needs from a transport: a descriptor to watch and
//! opaque "read next message" / "write message" operations.

use crate::core::WsplexError;
use bytes::Bytes;
use std::os::fd::RawFd;

/// An application payload carried by one WebSocket data frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Message::Binary(b.into())
    }

    /// The raw payload bytes, regardless of the frame kind.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Whether a write reached the socket or is still buffered by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Flushed,
    /// The socket buffer is full. The rest goes out on a later `flush`.
    Pending,
}

/// A duplex, message-oriented socket handle.
///
/// Implementations wrap a non-blocking OS socket together with a frame codec.
/// The dispatcher only reads after the poller reported the descriptor ready,
/// so `read_message` must never block waiting for a peer.
pub trait MessageStream: Send + 'static {
    /// The OS descriptor registered with the poller. Captured once when the
    /// stream is created and stable for its whole lifetime.
    fn descriptor(&self) -> RawFd;

    /// Reads the next complete message.
    ///
    /// Returns `Ok(None)` when no complete message is buffered yet. An orderly
    /// close by the peer is reported as `Err(WsplexError::ConnectionClosed)`.
    fn read_message(&mut self) -> Result<Option<Message>, WsplexError>;

    /// Queues one message and writes as much of it as the socket accepts.
    /// Never blocks; a full socket buffer reports `WriteStatus::Pending`.
    fn write_message(&mut self, message: Message) -> Result<WriteStatus, WsplexError>;

    /// Writes out whatever earlier writes left buffered. Never blocks.
    fn flush(&mut self) -> Result<WriteStatus, WsplexError>;

    /// Closes the transport. Must be safe to call on an already broken socket.
    fn close(&mut self);
}
