//     1          2          3
// ----------|----------|----------
//        RCV.NXT    RCV.NXT
//                  +RCV.WND
//
// 1 - old sequence numbers which have been acknowledged
// 2 - sequence numbers allowed for new reception
// 3 - future sequence numbers which are not yet allowed
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct ReceiveSequenceSpace {
    /// Initial receive sequence number
    pub irs: u32,
    /// Next sequence number expected on an incoming segment, and is the
    /// left or lower edge of the receive window
    pub nxt: u32,
    /// The window last advertised to the remote TCP, measured from `wup`
    pub wnd: u32,
    /// The value of `nxt` when the window was last advertised
    pub wup: u32,
}

impl ReceiveSequenceSpace {
    /// The right edge of the advertised window
    pub fn right_edge(&self) -> u32 {
        self.wup.wrapping_add(self.wnd)
    }

    /// The part of the advertised window still open beyond `nxt`. Never
    /// negative, even if the remote TCP overran the window.
    pub fn remaining(&self) -> u32 {
        let consumed = self.nxt.wrapping_sub(self.wup);
        self.wnd.saturating_sub(consumed)
    }
}
