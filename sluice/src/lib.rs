//! Replays TCP traces through the sluice engine.
//!
//! A trace file describes one connection: its handshake, the segments that
//! arrive from the remote TCP and the calls the application makes, each at a
//! given tick. The replayer feeds them to a [`sluice_core::Tcp`] registry and
//! prints every action the engine takes in response.

pub mod cli;
pub mod replay;
pub mod trace;
