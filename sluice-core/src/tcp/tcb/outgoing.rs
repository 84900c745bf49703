use super::{modular_cmp::after, timers::Ticks, Segment};
use crate::Message;
use std::collections::VecDeque;

/// The queues used for outgoing data
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Data bytes queued for transmission but not yet segmentized
    pub text: Message,
    /// The retransmission queue. Contains segments sent but not yet fully
    /// acknowledged, ordered by sequence number.
    retransmit: VecDeque<Transmit>,
    /// The number of segments on the retransmission queue
    packets_out: usize,
}

/// What removing acknowledged segments from the retransmission queue found.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cleaned {
    /// The number of segments removed
    pub removed: usize,
    /// When the oldest removed segment was last sent
    pub first_sent_at: Option<Ticks>,
    /// Whether the oldest removed segment had been retransmitted
    pub first_retransmitted: bool,
}

impl Outgoing {
    /// Places a freshly sent segment at the tail of the retransmission queue.
    pub fn push(&mut self, segment: Segment, now: Ticks) {
        if let Some(tail) = self.retransmit.back() {
            if tail.end_seq() != segment.seq {
                debug_assert!(false, "retransmission queue out of order");
                tracing::error!(
                    tail = tail.end_seq(),
                    seq = segment.seq,
                    "Retransmission queue out of order"
                );
            }
        }
        self.retransmit.push_back(Transmit::new(segment, now));
        self.packets_out += 1;
    }

    /// Removes every segment fully covered by `ack`.
    pub fn clean(&mut self, ack: u32) -> Cleaned {
        let mut cleaned = Cleaned::default();
        while let Some(head) = self.retransmit.front() {
            if after(head.end_seq(), ack) {
                break;
            }
            if cleaned.removed == 0 {
                cleaned.first_sent_at = Some(head.sent_at);
                cleaned.first_retransmitted = head.retransmitted;
            }
            self.retransmit.pop_front();
            cleaned.removed += 1;
            match self.packets_out.checked_sub(1) {
                Some(packets_out) => self.packets_out = packets_out,
                None => {
                    debug_assert!(false, "packets_out underflow");
                    tracing::error!("Segment removed with no packets out");
                }
            }
        }
        cleaned
    }

    /// The oldest unacknowledged segment
    pub fn head(&self) -> Option<&Transmit> {
        self.retransmit.front()
    }

    /// Records a retransmission of the oldest unacknowledged segment and
    /// returns it.
    pub fn retransmit_head(&mut self, now: Ticks) -> Option<&Segment> {
        let head = self.retransmit.front_mut()?;
        head.sent_at = now;
        head.retransmitted = true;
        Some(&head.segment)
    }

    pub fn packets_out(&self) -> usize {
        self.packets_out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transmit> {
        self.retransmit.iter()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A segment on the retransmission queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// The segment
    pub segment: Segment,
    /// When the segment was last sent
    pub sent_at: Ticks,
    /// Whether the segment has been sent more than once
    pub retransmitted: bool,
}

impl Transmit {
    /// Create a new Transmit
    pub fn new(segment: Segment, sent_at: Ticks) -> Self {
        Self {
            segment,
            sent_at,
            retransmitted: false,
        }
    }

    pub fn seq(&self) -> u32 {
        self.segment.seq
    }

    pub fn end_seq(&self) -> u32 {
        self.segment.end_seq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(seq: u32, len: usize) -> Segment {
        Segment::builder(seq).ack(1).text(vec![0u8; len]).build()
    }

    #[test]
    fn clean_removes_fully_acknowledged_segments() {
        let mut outgoing = Outgoing::default();
        outgoing.push(data(100, 10), 1);
        outgoing.push(data(110, 10), 2);
        outgoing.push(data(120, 10), 3);
        assert_eq!(outgoing.packets_out(), 3);

        // Partially acknowledged segments stay
        let cleaned = outgoing.clean(115);
        assert_eq!(cleaned.removed, 1);
        assert_eq!(cleaned.first_sent_at, Some(1));
        assert_eq!(outgoing.head().map(Transmit::seq), Some(110));

        let cleaned = outgoing.clean(130);
        assert_eq!(cleaned.removed, 2);
        assert_eq!(cleaned.first_sent_at, Some(2));
        assert_eq!(outgoing.packets_out(), 0);
        assert!(outgoing.head().is_none());
    }

    #[test]
    fn stale_ack_removes_nothing() {
        let mut outgoing = Outgoing::default();
        outgoing.push(data(100, 10), 1);
        assert_eq!(outgoing.clean(100), Cleaned::default());
        assert_eq!(outgoing.packets_out(), 1);
    }

    #[test]
    fn retransmission_is_recorded() {
        let mut outgoing = Outgoing::default();
        outgoing.push(data(u32::MAX - 4, 10), 1);
        let seq = outgoing.retransmit_head(50).map(|segment| segment.seq);
        assert_eq!(seq, Some(u32::MAX - 4));
        let cleaned = outgoing.clean(5);
        assert_eq!(cleaned.first_sent_at, Some(50));
        assert!(cleaned.first_retransmitted);
    }
}
