// src/connection/mod.rs

//! The per-session building blocks: identifiers, the message stream
//! capability, the registered `Connection` handle and the WebSocket stream.

mod handle;
mod session;
mod stream;
mod ws;

// Publicly re-export the primary types from the sub-modules.
pub use handle::{Connection, ConnectionState};
pub use session::SessionId;
pub use stream::{Message, MessageStream, WriteStatus};
pub use ws::{SESSION_HEADER, WsOptions, WsStream};
