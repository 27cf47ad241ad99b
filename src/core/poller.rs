// src/core/poller.rs

//! The readiness multiplexer, built on `mio`.
//!
//! One `Poller` serves every connection of the server, so a single blocked
//! `wait` covers tens of thousands of descriptors without a thread per
//! connection. Registration goes through a cloned `mio::Registry`, which the
//! OS allows from other threads while a `wait` is blocked.
//!
//! Registrations are edge-triggered: a descriptor is reported again only
//! after new data arrives. A reader that stops before draining the socket
//! has to remember the connection itself.

use super::errors::WsplexError;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// The default number of readiness events collected per `wait`.
pub const DEFAULT_MAX_EVENTS: usize = 100;

// Descriptors are non-negative, so they can never collide with this token.
const WAKE_TOKEN: Token = Token(usize::MAX);

/// One descriptor reported ready by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub descriptor: RawFd,
    pub readable: bool,
    pub hang_up: bool,
}

/// A reusable, fixed-capacity buffer filled by `Poller::wait`.
pub struct ReadinessBatch {
    events: Events,
    max_events: usize,
    woken: bool,
}

impl ReadinessBatch {
    /// Creates a batch that holds at most `max_events` entries (minimum 1).
    pub fn with_capacity(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self {
            events: Events::with_capacity(max_events),
            max_events,
            woken: false,
        }
    }

    /// The configured bound, not the allocator's rounding of it.
    pub fn capacity(&self) -> usize {
        self.max_events
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// True if the last `wait` returned because `Poller::wake` was called.
    pub fn woken(&self) -> bool {
        self.woken
    }

    pub fn iter(&self) -> impl Iterator<Item = Readiness> + '_ {
        self.events
            .iter()
            .filter(|event| event.token() != WAKE_TOKEN)
            .take(self.max_events)
            .map(|event| Readiness {
                descriptor: event.token().0 as RawFd,
                readable: event.is_readable(),
                hang_up: event.is_read_closed() || event.is_error(),
            })
    }
}

/// The process-wide readiness multiplexer.
pub struct Poller {
    poll: Mutex<Poll>,
    registry: Registry,
    waker: Waker,
}

impl Poller {
    /// Allocates the OS readiness object and its shutdown waker.
    ///
    /// Fails with `ResourceExhausted` when the descriptor table is full.
    pub fn new() -> Result<Self, WsplexError> {
        let poll = Poll::new().map_err(WsplexError::from_os)?;
        let registry = poll.registry().try_clone().map_err(WsplexError::from_os)?;
        let waker = Waker::new(&registry, WAKE_TOKEN).map_err(WsplexError::from_os)?;
        Ok(Self {
            poll: Mutex::new(poll),
            registry,
            waker,
        })
    }

    /// Adds `descriptor` to the interest set for readability and hang-up.
    pub fn register(&self, descriptor: RawFd) -> Result<(), WsplexError> {
        let token = token_for(descriptor)?;
        self.registry
            .register(&mut SourceFd(&descriptor), token, Interest::READABLE)
            .map_err(|e| match e.raw_os_error() {
                Some(libc::EEXIST) => {
                    WsplexError::AlreadyRegistered(format!("descriptor {descriptor}"))
                }
                _ => WsplexError::from_os(e),
            })
    }

    /// Removes `descriptor` from the interest set.
    ///
    /// A descriptor the kernel no longer knows (never added, or already
    /// closed) reports `NotRegistered`; callers log it and move on.
    pub fn unregister(&self, descriptor: RawFd) -> Result<(), WsplexError> {
        if descriptor < 0 {
            return Err(WsplexError::NotRegistered(descriptor));
        }
        self.registry
            .deregister(&mut SourceFd(&descriptor))
            .map_err(|e| not_registered(descriptor, e))
    }

    /// Blocks until at least one registered descriptor is ready, the timeout
    /// elapses, or `wake` is called. `None` waits indefinitely.
    ///
    /// On success the batch holds between 0 and `batch.capacity()` entries.
    /// Every failure other than a signal means the readiness object itself is
    /// unusable, so it is reported as `PollerFailed`.
    pub fn wait(
        &self,
        batch: &mut ReadinessBatch,
        timeout: Option<Duration>,
    ) -> Result<(), WsplexError> {
        batch.woken = false;
        let mut poll = self.poll.lock();
        if let Err(e) = poll.poll(&mut batch.events, timeout) {
            batch.events.clear();
            return Err(match WsplexError::from_os(e) {
                WsplexError::Io(io) => WsplexError::PollerFailed(io),
                other => other,
            });
        }
        batch.woken = batch.events.iter().any(|event| event.token() == WAKE_TOKEN);
        Ok(())
    }

    /// Interrupts a blocked `wait` from any thread.
    pub fn wake(&self) -> Result<(), WsplexError> {
        self.waker.wake().map_err(WsplexError::from)
    }
}

/// Waits until `descriptor` can accept more bytes or `timeout` elapses.
///
/// Returns `false` on timeout. Used by writers so they block on the socket
/// without holding any connection lock.
pub fn wait_writable(descriptor: RawFd, timeout: Duration) -> Result<bool, WsplexError> {
    let mut pollfd = libc::pollfd {
        fd: descriptor,
        events: libc::POLLOUT,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().clamp(1, i32::MAX as u128) as libc::c_int;
    loop {
        // SAFETY: `pollfd` is a single valid entry that outlives the call.
        let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if rc >= 0 {
            return Ok(rc > 0);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err.into());
        }
    }
}

fn token_for(descriptor: RawFd) -> Result<Token, WsplexError> {
    if descriptor < 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF).into());
    }
    Ok(Token(descriptor as usize))
}

fn not_registered(descriptor: RawFd, e: io::Error) -> WsplexError {
    match e.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::EBADF) => WsplexError::NotRegistered(descriptor),
        _ => WsplexError::from_os(e),
    }
}
