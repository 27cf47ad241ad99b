// src/core/mod.rs

//! The connection core: the readiness poller, the connection registry, the
//! dispatcher loop, and the collaborators that register and write to
//! sessions.

pub mod acceptor;
pub mod control;
pub mod dispatcher;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod poller;
pub mod registry;
pub mod state;
pub mod tasks;
pub mod workers;

pub use acceptor::SessionAcceptor;
pub use control::{AnnounceReport, ControlPlane};
pub use dispatcher::Dispatcher;
pub use errors::WsplexError;
pub use poller::{Poller, Readiness, ReadinessBatch};
pub use registry::ConnectionRegistry;
pub use state::ServerState;
