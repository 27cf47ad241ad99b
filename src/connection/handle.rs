// src/connection/handle.rs

//! Defines `Connection`, the registry's unit of ownership for one accepted,
//! upgraded session.

use super::session::SessionId;
use super::stream::{Message, MessageStream, WriteStatus};
use crate::core::{WsplexError, poller};
use parking_lot::Mutex;
use std::fmt;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

const STATE_ACTIVE: u8 = 0;
const STATE_CLOSED: u8 = 1;

/// The lifecycle state of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closed,
}

/// One registered session.
///
/// The identity fields never change after construction. The socket is
/// exclusively owned by the connection and dropped when it is closed, which
/// releases the descriptor back to the OS.
pub struct Connection<S> {
    session_id: SessionId,
    descriptor: RawFd,
    socket: Mutex<Option<S>>,
    state: AtomicU8,
    created: Instant,
}

impl<S> Connection<S> {
    pub(crate) fn new(session_id: SessionId, descriptor: RawFd, socket: S) -> Self {
        Self {
            session_id,
            descriptor,
            socket: Mutex::new(Some(socket)),
            state: AtomicU8::new(STATE_ACTIVE),
            created: Instant::now(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn descriptor(&self) -> RawFd {
        self.descriptor
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            STATE_ACTIVE => ConnectionState::Active,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Moves the connection from `Active` to `Closed`.
    ///
    /// Exactly one caller ever gets `true`; that caller owns the teardown
    /// sequence (unregister, delete, close).
    pub fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_ACTIVE,
                STATE_CLOSED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl<S: MessageStream> Connection<S> {
    /// Reads the next complete message from the socket.
    pub fn read_message(&self) -> Result<Option<Message>, WsplexError> {
        self.with_socket(|socket| socket.read_message())
    }

    /// Writes a message, waiting up to `timeout` for the peer to make room.
    ///
    /// The socket lock is only held while bytes are handed to the codec or
    /// flushed; waiting for buffer space happens outside it, so a peer that
    /// stops reading never blocks the dispatcher's reads on this connection.
    /// A connection that was closed in the meantime reports
    /// `ConnectionClosed`, which callers treat as a normal outcome of racing
    /// a teardown.
    pub fn write_message(&self, message: Message, timeout: Duration) -> Result<(), WsplexError> {
        let deadline = Instant::now() + timeout;
        let mut status = self.with_socket(|socket| socket.write_message(message))?;
        while status == WriteStatus::Pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !poller::wait_writable(self.descriptor, remaining)? {
                return Err(WsplexError::WriteTimeout(timeout.as_millis() as u64));
            }
            status = self.with_socket(|socket| socket.flush())?;
        }
        Ok(())
    }

    fn with_socket<T>(
        &self,
        op: impl FnOnce(&mut S) -> Result<T, WsplexError>,
    ) -> Result<T, WsplexError> {
        let mut guard = self.socket.lock();
        match guard.as_mut() {
            Some(socket) if self.is_active() => op(socket),
            _ => Err(WsplexError::ConnectionClosed),
        }
    }

    /// Closes and drops the socket. Idempotent.
    pub(crate) fn close_socket(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        if let Some(mut socket) = self.socket.lock().take() {
            socket.close();
        }
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .finish()
    }
}
