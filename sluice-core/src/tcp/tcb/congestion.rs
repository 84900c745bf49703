//! Slow start and congestion avoidance.
//!
//! The congestion window and slow start threshold are counted in segments.
//! Two strategies grow the window on acknowledgments of new data: the classic
//! Jacobson algorithm and a throughput-based variant after "TCP Vegas: New
//! Techniques for Congestion Detection and Avoidance", Brakmo et al., 1994.

use super::timers::Ticks;
use std::fmt;

/// The slow start threshold before any loss has been seen
pub const INITIAL_SSTHRESH: u32 = 0x7fff_ffff;
/// The smallest slow start threshold, in segments
pub const MIN_SSTHRESH: u32 = 2;

const VEGAS_ALPHA: u64 = 2;
const VEGAS_BETA: u64 = 4;
const VEGAS_GAMMA: u64 = 1;
const VEGAS_SHIFT: u32 = 12;

/// Selects the congestion avoidance strategy for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CongestionAlgorithm {
    #[default]
    Classic,
    Vegas,
}

impl fmt::Display for CongestionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CongestionAlgorithm::Classic => f.write_str("classic"),
            CongestionAlgorithm::Vegas => f.write_str("vegas"),
        }
    }
}

/// The congestion state shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionWindow {
    /// Congestion window
    pub cwnd: u32,
    /// Slow start threshold
    pub ssthresh: u32,
    /// Acknowledgments counted towards the next linear increase
    pub cong_count: u32,
}

impl CongestionWindow {
    pub fn new(cwnd: u32, ssthresh: u32) -> Self {
        Self {
            cwnd: cwnd.max(1),
            ssthresh: ssthresh.max(MIN_SSTHRESH),
            cong_count: 0,
        }
    }

    /// Half the current window, never less than two segments.
    pub fn halved(&self) -> u32 {
        (self.cwnd >> 1).max(MIN_SSTHRESH)
    }

    /// Collapses the window to one segment after a retransmission timeout.
    pub fn on_timeout(&mut self) {
        self.ssthresh = self.halved();
        self.cwnd = 1;
        self.cong_count = 0;
    }

    /// Whether the window is still growing exponentially.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd <= self.ssthresh
    }
}

impl Default for CongestionWindow {
    fn default() -> Self {
        Self::new(1, INITIAL_SSTHRESH)
    }
}

/// An acknowledgment of new data, as seen by congestion avoidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    /// SND.UNA before the acknowledgment
    pub seq: u32,
    /// The acknowledgment number
    pub ack: u32,
    /// The round trip time measured from the oldest acknowledged segment
    pub rtt: Ticks,
    /// SND.NXT when the acknowledgment arrived
    pub snd_nxt: u32,
    /// Maximum segment size in octets
    pub mss: u32,
}

/// Grows or shrinks the congestion window as new data is acknowledged.
pub trait CongestionAvoidance {
    fn on_ack(&mut self, window: &mut CongestionWindow, event: &AckEvent);
}

/// Jacobson's slow start and congestion avoidance. Grows by one segment per
/// acknowledgment below the threshold and by roughly `1/cwnd` above it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Classic;

impl CongestionAvoidance for Classic {
    fn on_ack(&mut self, window: &mut CongestionWindow, _event: &AckEvent) {
        if window.in_slow_start() {
            window.cwnd += 1;
        } else if window.cong_count >= window.cwnd {
            window.cwnd += 1;
            window.cong_count = 0;
        } else {
            window.cong_count += 1;
        }
    }
}

/// Throughput-based congestion avoidance. Compares the throughput expected
/// from the lowest round trip seen against the throughput actually measured
/// and keeps the difference between `alpha` and `beta` segments worth of
/// queueing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Vegas {
    /// The lowest round trip seen, zero until the first sample
    basertt: Ticks,
}

impl Vegas {
    pub fn basertt(&self) -> Ticks {
        self.basertt
    }
}

impl CongestionAvoidance for Vegas {
    fn on_ack(&mut self, window: &mut CongestionWindow, event: &AckEvent) {
        let rtt = event.rtt.max(1);
        self.basertt = if self.basertt == 0 {
            rtt
        } else {
            self.basertt.min(rtt)
        };

        let inv_rtt = (1u64 << VEGAS_SHIFT) / rtt;
        let inv_basertt = (1u64 << VEGAS_SHIFT) / self.basertt;
        let acked = event.ack.wrapping_sub(event.seq) as u64;
        let in_flight = event.snd_nxt.wrapping_sub(event.seq) as u64;
        let actual = (acked << VEGAS_SHIFT).saturating_mul(inv_rtt);
        let expected = (in_flight << VEGAS_SHIFT).saturating_mul(inv_basertt);
        let diff = expected.saturating_sub(actual);
        let threshold =
            |segments: u64| (segments << VEGAS_SHIFT) * event.mss as u64 * inv_basertt;

        if window.cwnd < window.ssthresh
            && (event.seq == event.snd_nxt || diff <= threshold(VEGAS_GAMMA))
        {
            // Exponential growth only every other round trip
            if window.cong_count > 0 {
                window.cwnd += 1;
                window.cong_count = 0;
            } else {
                window.cong_count += 1;
            }
            return;
        }

        if diff <= threshold(VEGAS_ALPHA) {
            if window.cong_count >= window.cwnd {
                window.cwnd += 1;
                window.cong_count = 0;
            } else {
                window.cong_count += 1;
            }
        } else if diff >= threshold(VEGAS_BETA) {
            if window.cong_count >= window.cwnd {
                window.cwnd -= 1;
                window.cong_count = 0;
            } else {
                window.cong_count += 1;
            }
            window.cwnd = window.cwnd.max(MIN_SSTHRESH);
        }
    }
}

/// The strategy chosen for a connection at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Classic(Classic),
    Vegas(Vegas),
}

impl Strategy {
    pub fn algorithm(&self) -> CongestionAlgorithm {
        match self {
            Strategy::Classic(_) => CongestionAlgorithm::Classic,
            Strategy::Vegas(_) => CongestionAlgorithm::Vegas,
        }
    }
}

impl From<CongestionAlgorithm> for Strategy {
    fn from(algorithm: CongestionAlgorithm) -> Self {
        match algorithm {
            CongestionAlgorithm::Classic => Strategy::Classic(Classic),
            CongestionAlgorithm::Vegas => Strategy::Vegas(Vegas::default()),
        }
    }
}

impl CongestionAvoidance for Strategy {
    fn on_ack(&mut self, window: &mut CongestionWindow, event: &AckEvent) {
        match self {
            Strategy::Classic(classic) => classic.on_ack(window, event),
            Strategy::Vegas(vegas) => vegas.on_ack(window, event),
        }
    }
}
