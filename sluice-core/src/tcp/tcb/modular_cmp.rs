//! Comparisons on 32-bit sequence numbers, which wrap around.
//!
//! Two sequence numbers are ordered by the sign of their wrapping difference,
//! so any two numbers less than 2^31 apart compare the way they would on an
//! unbounded number line.

/// a < b under modular arithmetic
pub fn before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// a > b under modular arithmetic
pub fn after(a: u32, b: u32) -> bool {
    before(b, a)
}

/// a <= b <= c under modular arithmetic, where `a` is the lower edge of the
/// range.
pub fn between(a: u32, b: u32, c: u32) -> bool {
    c.wrapping_sub(a) >= b.wrapping_sub(a)
}

/// Whether a segment occupying `[seq, end_seq)` is acceptable to a receiver
/// expecting `rcv_nxt` with `rcv_wnd` octets of window.
///
/// ```text
/// Segment Length  Receive Window  Test
/// --------------  --------------  -------------------------------------------
///        0              0         SEG.SEQ = RCV.NXT
///        0             >0         RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
///       >0              0         not acceptable
///       >0             >0         RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
///                              or RCV.NXT =< SEG.SEQ+SEG.LEN-1 < RCV.NXT+RCV.WND
/// ```
pub fn in_window(seq: u32, end_seq: u32, rcv_nxt: u32, rcv_wnd: u32) -> bool {
    let right_edge = rcv_nxt.wrapping_add(rcv_wnd);
    if seq == end_seq {
        if rcv_wnd == 0 {
            seq == rcv_nxt
        } else {
            !before(seq, rcv_nxt) && before(seq, right_edge)
        }
    } else if rcv_wnd == 0 {
        false
    } else {
        // At least one octet of [seq, end_seq) lands in [rcv_nxt, right_edge)
        before(seq, right_edge) && after(end_seq, rcv_nxt)
    }
}
