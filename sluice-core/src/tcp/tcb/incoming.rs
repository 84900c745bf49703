use super::{
    modular_cmp::{after, before},
    Segment,
};
use std::collections::VecDeque;

/// The reassembly queue. Holds segments that arrived ahead of RCV.NXT, ordered
/// by sequence number, until the hole in front of them closes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Incoming {
    segments: VecDeque<Segment>,
    /// Octets of text held
    bytes: usize,
}

impl Incoming {
    /// Queues an out-of-order segment. A segment starting where a queued one
    /// starts replaces it only if it is longer. Returns whether the segment
    /// was kept.
    pub fn insert(&mut self, segment: Segment) -> bool {
        let position = self
            .segments
            .iter()
            .position(|queued| !before(queued.seq, segment.seq));
        match position {
            Some(i) if self.segments[i].seq == segment.seq => {
                if self.segments[i].seg_len() >= segment.seg_len() {
                    return false;
                }
                self.bytes -= self.segments[i].text.len();
                self.bytes += segment.text.len();
                self.segments[i] = segment;
            }
            Some(i) => {
                self.bytes += segment.text.len();
                self.segments.insert(i, segment);
            }
            None => {
                self.bytes += segment.text.len();
                self.segments.push_back(segment);
            }
        }
        true
    }

    /// Takes the next segment that continues the stream at `rcv_nxt`, trimmed
    /// to start there. Segments wholly covered by what was already received are
    /// discarded along the way.
    pub fn next_in_order(&mut self, rcv_nxt: u32) -> Option<Segment> {
        loop {
            let head = self.segments.front()?;
            if after(head.seq, rcv_nxt) {
                return None;
            }
            let mut head = self.segments.pop_front()?;
            self.bytes -= head.text.len();
            if !after(head.end_seq(), rcv_nxt) {
                tracing::trace!(seq = head.seq, "Dropping duplicate from reassembly");
                continue;
            }
            trim_front(&mut head, rcv_nxt);
            return Some(head);
        }
    }

    /// Drops segments from the tail until at most `limit` octets are held.
    /// Returns the number of segments dropped.
    pub fn prune(&mut self, limit: usize) -> usize {
        let mut dropped = 0;
        while self.bytes > limit {
            let Some(tail) = self.segments.pop_back() else {
                break;
            };
            self.bytes -= tail.text.len();
            dropped += 1;
        }
        dropped
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.bytes = 0;
    }
}

/// Drops the octets of `segment` before `seq`. The caller guarantees that
/// `seq` falls inside the segment.
pub fn trim_front(segment: &mut Segment, seq: u32) {
    if !after(seq, segment.seq) {
        return;
    }
    let mut skip = seq.wrapping_sub(segment.seq);
    if segment.ctl.syn() {
        segment.ctl.set_syn(false);
        skip -= 1;
    }
    let skip = (skip as usize).min(segment.text.len());
    segment.text.remove_front(skip);
    segment.urg = segment.urg.saturating_sub(skip as u16);
    segment.seq = seq;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(seq: u32, text: &[u8]) -> Segment {
        Segment::builder(seq).ack(1).text(text).build()
    }

    #[test]
    fn keeps_segments_sorted() {
        let mut incoming = Incoming::default();
        incoming.insert(data(300, b"cc"));
        incoming.insert(data(100, b"aa"));
        incoming.insert(data(200, b"bb"));
        let seqs: Vec<_> = incoming.iter().map(|segment| segment.seq).collect();
        assert_eq!(seqs, vec![100, 200, 300]);
        assert_eq!(incoming.bytes(), 6);
    }

    #[test]
    fn same_start_keeps_the_longer_segment() {
        let mut incoming = Incoming::default();
        assert!(incoming.insert(data(100, b"abcd")));
        assert!(!incoming.insert(data(100, b"ab")));
        assert!(incoming.insert(data(100, b"abcdef")));
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming.bytes(), 6);
    }

    #[test]
    fn drains_in_order_and_trims_overlap() {
        let mut incoming = Incoming::default();
        incoming.insert(data(105, b"fghij"));
        incoming.insert(data(102, b"cde"));
        incoming.insert(data(100, b"ab"));

        // Nothing at 90
        assert!(incoming.next_in_order(90).is_none());

        let first = incoming.next_in_order(101).unwrap();
        assert_eq!(first.seq, 101);
        assert_eq!(first.text.to_vec(), b"b");

        let second = incoming.next_in_order(102).unwrap();
        assert_eq!(second.text.to_vec(), b"cde");

        let third = incoming.next_in_order(107).unwrap();
        assert_eq!(third.seq, 107);
        assert_eq!(third.text.to_vec(), b"hij");
        assert!(incoming.is_empty());
        assert_eq!(incoming.bytes(), 0);
    }

    #[test]
    fn duplicates_are_discarded_while_draining() {
        let mut incoming = Incoming::default();
        incoming.insert(data(100, b"ab"));
        incoming.insert(data(110, b"xy"));
        assert!(incoming.next_in_order(110).map(|s| s.seq) == Some(110));
        assert!(incoming.is_empty());
    }

    #[test]
    fn prune_drops_from_the_tail() {
        let mut incoming = Incoming::default();
        incoming.insert(data(100, b"aaaa"));
        incoming.insert(data(200, b"bbbb"));
        incoming.insert(data(300, b"cccc"));
        assert_eq!(incoming.prune(5), 2);
        assert_eq!(incoming.iter().map(|s| s.seq).collect::<Vec<_>>(), vec![100]);
    }

    #[test]
    fn fin_survives_trimming() {
        let mut segment = Segment::builder(100).ack(1).fin().text(b"abc".as_slice()).build();
        trim_front(&mut segment, 103);
        assert!(segment.text.is_empty());
        assert!(segment.ctl.fin());
        assert_eq!(segment.end_seq(), 104);
    }
}
