use std::fmt;

/// The state of the TCP state machine as described in RFC 9293 section 3.3.2.
/// A control block is handed to the engine once the handshake has completed;
/// the two synchronizing states are kept so that resets reported by the
/// handshake collaborator map onto the same errors.
///
/// ```text
///                             +---------+
///                             |  ESTAB  |
///                             +---------+
///                      CLOSE    |     |    rcv FIN
///                     -------   |     |    -------
/// +---------+         snd FIN  /       \   snd ACK         +---------+
/// |  FIN    |<----------------          ------------------>|  CLOSE  |
/// | WAIT-1  |------------------                            |   WAIT  |
/// +---------+          rcv FIN  \                          +---------+
///   | rcv ACK of FIN   -------   |                          CLOSE  |
///   | --------------   snd ACK   |                         ------- |
///   V        x                   V                         snd FIN V
/// +---------+               +---------+                    +---------+
/// |FINWAIT-2|               | CLOSING |                    | LAST-ACK|
/// +---------+               +---------+                    +---------+
///   |              rcv ACK of FIN |                 rcv ACK of FIN |
///   |  rcv FIN     -------------- |    Timeout=2MSL -------------- |
///   |  -------            x       V    ------------        x       V
///    \ snd ACK              +---------+delete TCB          +---------+
///      -------------------->|TIME-WAIT|------------------->| CLOSED  |
///                           +---------+                    +---------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for a matching connection request after having sent a connection
    /// request.
    SynSent,
    /// Waiting for a confirming connection request acknowledgment after having
    /// both received and sent a connection request.
    SynReceived,
    /// An open connection, data received can be delivered to the user. The
    /// normal state for the data transfer phase of the connection.
    Established,
    /// Waiting for a connection termination request from the remote TCP, or an
    /// acknowledgment of the connection termination request previously sent.
    FinWait1,
    /// Waiting for a connection termination request from the remote TCP.
    FinWait2,
    /// Waiting for a connection termination request from the local user.
    CloseWait,
    /// Waiting for a connection termination request acknowledgment from the
    /// remote TCP.
    Closing,
    /// Waiting for an acknowledgment of the connection termination request
    /// previously sent to the remote TCP (which includes an acknowledgment of
    /// its connection termination request).
    LastAck,
    /// Waiting for enough time to pass to be sure the remote TCP received the
    /// acknowledgment of its connection termination request.
    TimeWait,
    /// No connection state at all.
    Closed,
}

/// What receiving a FIN does to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinTransition {
    /// Move to the given state
    Enter(State),
    /// A retransmitted FIN in TIME-WAIT. Restart the 2 MSL timer.
    RestartTimeWait,
    /// The FIN was already seen or cannot be processed in this state
    Ignore,
}

impl State {
    /// The transition taken when the remote TCP's FIN is received in order.
    pub fn fin_received(self) -> FinTransition {
        match self {
            State::SynReceived | State::Established => FinTransition::Enter(State::CloseWait),
            // Simultaneous close
            State::FinWait1 => FinTransition::Enter(State::Closing),
            State::FinWait2 => FinTransition::Enter(State::TimeWait),
            State::TimeWait => FinTransition::RestartTimeWait,
            State::SynSent
            | State::CloseWait
            | State::Closing
            | State::LastAck
            | State::Closed => FinTransition::Ignore,
        }
    }

    /// The transition taken once the local FIN has been acknowledged.
    pub fn fin_acknowledged(self) -> Option<State> {
        match self {
            State::FinWait1 => Some(State::FinWait2),
            State::Closing => Some(State::TimeWait),
            State::LastAck => Some(State::Closed),
            _ => None,
        }
    }

    /// The transition taken when the local user closes the connection.
    pub fn close_requested(self) -> Option<State> {
        match self {
            State::SynReceived | State::Established => Some(State::FinWait1),
            State::CloseWait => Some(State::LastAck),
            _ => None,
        }
    }

    /// Whether segment text is still delivered to the user. Text arriving
    /// after the remote FIN is ignored.
    pub fn accepts_text(self) -> bool {
        matches!(
            self,
            State::SynReceived | State::Established | State::FinWait1 | State::FinWait2
        )
    }

    /// Whether the local user may still queue data for sending.
    pub fn accepts_send(self) -> bool {
        matches!(self, State::Established | State::CloseWait)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            State::SynSent => "SYN-SENT",
            State::SynReceived => "SYN-RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN-WAIT-1",
            State::FinWait2 => "FIN-WAIT-2",
            State::CloseWait => "CLOSE-WAIT",
            State::Closing => "CLOSING",
            State::LastAck => "LAST-ACK",
            State::TimeWait => "TIME-WAIT",
            State::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fin_transitions() {
        assert_eq!(
            State::Established.fin_received(),
            FinTransition::Enter(State::CloseWait)
        );
        assert_eq!(
            State::FinWait1.fin_received(),
            FinTransition::Enter(State::Closing)
        );
        assert_eq!(
            State::FinWait2.fin_received(),
            FinTransition::Enter(State::TimeWait)
        );
        assert_eq!(State::TimeWait.fin_received(), FinTransition::RestartTimeWait);
        assert_eq!(State::CloseWait.fin_received(), FinTransition::Ignore);
    }

    #[test]
    fn fin_acknowledged_transitions() {
        assert_eq!(State::FinWait1.fin_acknowledged(), Some(State::FinWait2));
        assert_eq!(State::Closing.fin_acknowledged(), Some(State::TimeWait));
        assert_eq!(State::LastAck.fin_acknowledged(), Some(State::Closed));
        assert_eq!(State::Established.fin_acknowledged(), None);
    }

    #[test]
    fn close_transitions() {
        assert_eq!(State::Established.close_requested(), Some(State::FinWait1));
        assert_eq!(State::CloseWait.close_requested(), Some(State::LastAck));
        assert_eq!(State::FinWait2.close_requested(), None);
    }
}
