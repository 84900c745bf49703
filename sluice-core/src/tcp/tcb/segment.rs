use crate::Message;

/// The number of 32-bit words in a TCP header without options
pub const BASE_HEADER_WORDS: u8 = 5;

/// A parsed TCP segment as handed over by the header parser, or one produced by
/// the engine for transmission. Ports, checksum and options are owned by the
/// collaborators on either side and are not represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The sequence number of the first octet of the segment
    pub seq: u32,
    /// The next sequence number the sender of the segment expects to receive,
    /// significant when the ACK control bit is set
    pub ack: u32,
    /// The number of 32-bit words in the TCP header
    pub data_offset: u8,
    /// Control bits
    pub ctl: Control,
    /// The sender's receive window
    pub wnd: u16,
    /// Offset from `seq` to the octet following the urgent data, significant
    /// when the URG control bit is set
    pub urg: u16,
    /// The segment data
    pub text: Message,
}

impl Segment {
    /// Start building a segment with the given sequence number.
    pub fn builder(seq: u32) -> SegmentBuilder {
        SegmentBuilder::new(seq)
    }

    /// The length of the segment in sequence space, including any control bits
    pub fn seg_len(&self) -> u32 {
        self.text.len() as u32 + self.ctl.syn() as u32 + self.ctl.fin() as u32
    }

    /// The sequence number following this segment
    pub fn end_seq(&self) -> u32 {
        self.seq.wrapping_add(self.seg_len())
    }

    /// The header word used for header prediction: data offset, control bits
    /// without PSH, and window.
    pub fn prediction_word(&self) -> u32 {
        let mut ctl = self.ctl;
        ctl.set_psh(false);
        prediction_word(self.data_offset, ctl, self.wnd)
    }
}

/// Packs the header fields compared by header prediction into one word.
pub fn prediction_word(data_offset: u8, ctl: Control, wnd: u16) -> u32 {
    (data_offset as u32) << 28 | (u8::from(ctl) as u32) << 16 | wnd as u32
}

/// Used for building segments
#[derive(Debug)]
pub struct SegmentBuilder(Segment);

impl SegmentBuilder {
    /// Initialize the segment with defaults and the given sequence number
    pub fn new(seq: u32) -> Self {
        Self(Segment {
            seq,
            ack: 0,
            data_offset: BASE_HEADER_WORDS,
            ctl: Control::default(),
            wnd: 0,
            urg: 0,
            text: Message::default(),
        })
    }

    /// Set the window size
    pub fn wnd(mut self, wnd: u16) -> Self {
        self.0.wnd = wnd;
        self
    }

    /// Set the acknowledgement number
    pub fn ack(mut self, ack: u32) -> Self {
        self.0.ack = ack;
        self.0.ctl.set_ack(true);
        self
    }

    /// Set the psh bit
    pub fn psh(mut self) -> Self {
        self.0.ctl.set_psh(true);
        self
    }

    /// Set the rst bit
    pub fn rst(mut self) -> Self {
        self.0.ctl.set_rst(true);
        self
    }

    /// Set the syn bit
    pub fn syn(mut self) -> Self {
        self.0.ctl.set_syn(true);
        self
    }

    /// Set the fin bit
    pub fn fin(mut self) -> Self {
        self.0.ctl.set_fin(true);
        self
    }

    /// Set the urgent pointer
    pub fn urg(mut self, urg: u16) -> Self {
        self.0.ctl.set_urg(true);
        self.0.urg = urg;
        self
    }

    /// Set the header length in 32-bit words
    pub fn data_offset(mut self, words: u8) -> Self {
        self.0.data_offset = words;
        self
    }

    /// Set the segment data
    pub fn text(mut self, text: impl Into<Message>) -> Self {
        self.0.text = text.into();
        self
    }

    pub fn build(self) -> Segment {
        self.0
    }
}

/// The control bits of a TCP header
#[derive(Default, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Control(u8);

impl Control {
    /// The ACK bit on its own
    pub const ACK: Self = Self::new(false, true, false, false, false, false);

    /// Create a new Control with the given bits
    pub const fn new(urg: bool, ack: bool, psh: bool, rst: bool, syn: bool, fin: bool) -> Self {
        Self(
            fin as u8
                | (syn as u8) << 1
                | (rst as u8) << 2
                | (psh as u8) << 3
                | (ack as u8) << 4
                | (urg as u8) << 5,
        )
    }

    /// Get whether the urgent pointer field is significant
    pub const fn urg(self) -> bool {
        self.bit(5)
    }

    pub fn set_urg(&mut self, state: bool) {
        self.set_bit(5, state);
    }

    /// Get whether the acknowledgment field significant
    pub const fn ack(self) -> bool {
        self.bit(4)
    }

    pub fn set_ack(&mut self, state: bool) {
        self.set_bit(4, state);
    }

    /// Get whether the push function is enabled
    pub const fn psh(self) -> bool {
        self.bit(3)
    }

    pub fn set_psh(&mut self, state: bool) {
        self.set_bit(3, state);
    }

    /// Get whether to reset the connection
    pub const fn rst(self) -> bool {
        self.bit(2)
    }

    pub fn set_rst(&mut self, state: bool) {
        self.set_bit(2, state);
    }

    /// Get whether to synchronize sequence numbers
    pub const fn syn(self) -> bool {
        self.bit(1)
    }

    pub fn set_syn(&mut self, state: bool) {
        self.set_bit(1, state);
    }

    /// Get whether there is no more data from the sender
    pub const fn fin(self) -> bool {
        self.bit(0)
    }

    pub fn set_fin(&mut self, state: bool) {
        self.set_bit(0, state);
    }

    const fn bit(self, bit: u8) -> bool {
        (self.0 >> bit) & 0b1 == 1
    }

    fn set_bit(&mut self, bit: u8, state: bool) {
        self.0 = (self.0 & !(1 << bit)) | ((state as u8) << bit);
    }
}

impl From<u8> for Control {
    fn from(n: u8) -> Self {
        Self(n & 0b11_1111)
    }
}

impl From<Control> for u8 {
    fn from(control: Control) -> Self {
        control.0
    }
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (self.urg(), "URG"),
            (self.ack(), "ACK"),
            (self.psh(), "PSH"),
            (self.rst(), "RST"),
            (self.syn(), "SYN"),
            (self.fin(), "FIN"),
        ];
        write!(f, "Control(")?;
        let mut wrote = false;
        for (_, name) in names.iter().filter(|(set, _)| *set) {
            if wrote {
                write!(f, ", ")?;
            }
            wrote = true;
            write!(f, "{name}")?;
        }
        write!(f, ")")
    }
}

/// The set bits as trace letters, e.g. `AP` for ACK and PSH
impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letters = [
            (self.ack(), 'A'),
            (self.fin(), 'F'),
            (self.rst(), 'R'),
            (self.syn(), 'S'),
            (self.urg(), 'U'),
            (self.psh(), 'P'),
        ];
        for (_, letter) in letters.iter().filter(|(set, _)| *set) {
            write!(f, "{letter}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "seq={} ack={} win={} len={} flags={}",
            self.seq,
            self.ack,
            self.wnd,
            self.text.len(),
            self.ctl
        )?;
        if self.ctl.urg() {
            write!(f, " urg={}", self.urg)?;
        }
        Ok(())
    }
}
