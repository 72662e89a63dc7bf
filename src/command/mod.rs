//! Command protocol: orchestrator → controller
//!
//! The orchestrator opens a TCP connection per command, writes one JSON
//! control message and closes its write side. The [`Dispatcher`] routes the
//! message to the VM, user and host managers or to the firewall compiler,
//! and correlates `*_ACK` messages with the requests they answer.

mod dispatch;
mod message;
mod pending;
mod server;

pub use dispatch::Dispatcher;
pub use message::{require_key, text_key, ControlMessage, Function, StatusReply};
pub use pending::{AckMatch, PendingRequest, PendingTable, CORRELATION_KEY};
pub use server::{CommandServer, ServerOptions, DEFAULT_MAX_MESSAGE_BYTES};
