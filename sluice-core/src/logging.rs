//! Wrapper functions for the engine's structured events.
//! Each function corresponds to one kind of event and logs under its own
//! target, so a subscriber can filter connection state, retransmissions and
//! congestion window changes independently.

use crate::tcp::{ConnectionId, State};
use tracing::{event, Level};

/// Logged whenever a connection changes state. Captures the following data:
/// local, remote, from, to
pub fn state_event(id: ConnectionId, from: State, to: State) {
    event!(
        target: "STATE",
        Level::INFO,
        local = %id.local,
        remote = %id.remote,
        from = %from,
        to = %to,
    );
}

/// Logged when a segment is sent again. Captures the following data:
/// local, remote, seq, len, reason, attempt
pub fn retransmit_event(id: ConnectionId, seq: u32, len: u32, reason: &str, attempt: u32) {
    event!(
        target: "RETRANSMIT",
        Level::INFO,
        local = %id.local,
        remote = %id.remote,
        seq,
        len,
        reason,
        attempt,
    );
}

/// Logged when the congestion window or threshold changes for a reason other
/// than ordinary growth. Captures the following data:
/// local, remote, cwnd, ssthresh, cause
pub fn congestion_event(id: ConnectionId, cwnd: u32, ssthresh: u32, cause: &str) {
    event!(
        target: "CONGESTION",
        Level::DEBUG,
        local = %id.local,
        remote = %id.remote,
        cwnd,
        ssthresh,
        cause,
    );
}
