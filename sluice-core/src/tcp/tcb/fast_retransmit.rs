use super::{congestion::CongestionWindow, modular_cmp::after};

/// The number of duplicate acknowledgments that trigger a retransmission
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// Duplicate acknowledgment counting for fast retransmit and fast recovery, as
/// described in RFC 5681 section 3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastRetransmit {
    dup_acks: u32,
    /// SND.NXT when the current loss episode began. Duplicates at or before
    /// this point belong to the episode and are not counted again.
    high_seq: u32,
}

/// What an acknowledgment did to fast retransmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastRetransmitOutcome {
    /// A duplicate below the threshold, with the running count
    Counted(u32),
    /// The third duplicate. The oldest unacknowledged segment should be
    /// retransmitted now.
    Retransmit,
    /// A duplicate beyond the threshold inflated the window
    Inflated,
    /// New data acknowledged after a fast retransmit. The window was deflated
    /// to the slow start threshold.
    Deflated,
    /// Not a duplicate
    Reset,
}

impl FastRetransmit {
    pub fn new(high_seq: u32) -> Self {
        Self {
            dup_acks: 0,
            high_seq,
        }
    }

    /// Accounts for an incoming acknowledgment. `snd_una` is the value before
    /// the acknowledgment is applied and `not_dup` is set when the segment
    /// carried data or updated the window.
    pub fn on_ack(
        &mut self,
        window: &mut CongestionWindow,
        ack: u32,
        snd_una: u32,
        packets_out: usize,
        not_dup: bool,
    ) -> FastRetransmitOutcome {
        if ack == snd_una && packets_out > 0 && !not_dup && after(ack, self.high_seq) {
            self.dup_acks += 1;
            match self.dup_acks.cmp(&DUP_ACK_THRESHOLD) {
                std::cmp::Ordering::Less => FastRetransmitOutcome::Counted(self.dup_acks),
                std::cmp::Ordering::Equal => {
                    window.ssthresh = window.halved();
                    window.cwnd = window.ssthresh + DUP_ACK_THRESHOLD;
                    FastRetransmitOutcome::Retransmit
                }
                std::cmp::Ordering::Greater => {
                    window.cwnd += 1;
                    FastRetransmitOutcome::Inflated
                }
            }
        } else {
            let recovering = self.in_recovery();
            self.dup_acks = 0;
            if recovering {
                window.cwnd = window.ssthresh;
                FastRetransmitOutcome::Deflated
            } else {
                FastRetransmitOutcome::Reset
            }
        }
    }

    /// Starts a new loss episode after a retransmission timeout.
    pub fn on_timeout(&mut self, snd_nxt: u32) {
        self.high_seq = snd_nxt;
        self.dup_acks = 0;
    }

    pub fn dup_acks(&self) -> u32 {
        self.dup_acks
    }

    pub fn high_seq(&self) -> u32 {
        self.high_seq
    }

    /// Whether a fast retransmit has happened and the window is inflated.
    pub fn in_recovery(&self) -> bool {
        self.dup_acks >= DUP_ACK_THRESHOLD
    }
}
