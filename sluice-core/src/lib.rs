//! A TCP receive-side protocol engine.
//!
//! The engine takes over a connection once its handshake has completed and
//! handles everything driven by incoming segments and timers: acknowledgment
//! processing, round trip estimation, slow start and congestion avoidance,
//! fast retransmit and recovery, delayed acknowledgments, reassembly of
//! out-of-order data and the closing half of the state machine.
//!
//! The engine performs no I/O. Header parsing, checksums, routing and the
//! socket layer are left to the caller, which feeds parsed [`Segment`]s and
//! clock ticks in and carries out the [`Action`](tcp::Action)s that come out.
//!
//! # Organization
//! - [`Message`] holds segment text and the receive queue without copying
//! - [`tcp::Tcb`] is the per-connection protocol engine, built from the pieces
//!   in [`tcp::tcb`]
//! - [`Tcp`] is a registry of connections that routes segments and drives
//!   timers on a tokio runtime

#![warn(missing_debug_implementations)]

pub mod message;
pub use message::Message;

pub mod logging;

pub mod shutdown;
pub use shutdown::Shutdown;

pub mod tcp;
pub use tcp::{ConnectionId, Endpoint, Segment, Tcp, TcpConfig};
