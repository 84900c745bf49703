use super::timers::{Ticks, HZ};

/// The smallest retransmission timeout
pub const MIN_RTO: Ticks = HZ / 5;
/// The largest retransmission timeout, also the cap on backed-off timeouts
pub const MAX_RTO: Ticks = 120 * HZ;
/// The retransmission timeout used before the first sample arrives
pub const INITIAL_RTO: Ticks = 3 * HZ;
/// The smallest delayed-ACK timeout
pub const MIN_ATO: Ticks = HZ / 50;
/// The delayed-ACK timeout used for the first data segment
pub const INITIAL_ATO: Ticks = HZ / 5;

const MAX_BACKOFF: u32 = 16;

/// Round trip and delayed-ACK interval estimation.
///
/// Follows "Congestion Avoidance and Control", Van Jacobson, Michael J.
/// Karels, 1988. `srtt` is kept scaled by 8 and `mdev` by 4 so the smoothing
/// gains of 1/8 and 1/4 are plain shifts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RttEstimator {
    /// Smoothed round trip time, scaled by 8. Zero until the first sample.
    srtt: Ticks,
    /// Mean deviation, scaled by 4
    mdev: Ticks,
    rto: Ticks,
    /// Number of times the timeout has been doubled since the last sample
    backoff: u32,
    /// Delayed-ACK timeout. Zero means acknowledge immediately.
    ato: Ticks,
    /// Smoothed packet inter-arrival time, scaled by 8
    iat: Ticks,
    /// Inter-arrival mean deviation, scaled by 4
    iat_mdev: Ticks,
    /// When the last data segment arrived
    lrcvtime: Option<Ticks>,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self {
            srtt: 0,
            mdev: 0,
            rto: INITIAL_RTO,
            backoff: 0,
            ato: 0,
            iat: 0,
            iat_mdev: 0,
            lrcvtime: None,
        }
    }
}

impl RttEstimator {
    /// Folds a round trip measurement into the estimate. Must not be called
    /// with measurements of retransmitted segments.
    pub fn sample(&mut self, measured: Ticks) {
        let m = measured as i64;
        if self.srtt != 0 {
            let err = m - (self.srtt >> 3) as i64;
            self.srtt = (self.srtt as i64 + err).max(1) as Ticks;
            let err = err.abs() - (self.mdev >> 2) as i64;
            self.mdev = (self.mdev as i64 + err).max(0) as Ticks;
        } else {
            self.srtt = measured << 3;
            self.mdev = measured << 2;
        }
        self.rto = ((self.srtt >> 3) + self.mdev).clamp(MIN_RTO, MAX_RTO);
        self.backoff = 0;
        tracing::trace!(
            srtt = self.srtt,
            mdev = self.mdev,
            rto = self.rto,
            "round trip sample {measured}"
        );
    }

    /// Updates the delayed-ACK timeout from the arrival time of a data segment.
    pub fn delack_sample(&mut self, now: Ticks) {
        let Some(last) = self.lrcvtime.replace(now) else {
            self.ato = INITIAL_ATO;
            return;
        };
        let m = now.saturating_sub(last);
        // Gaps longer than twice the round trip say nothing about the
        // sender's pacing
        if (m << 2) <= self.srtt {
            let err = m as i64 - (self.iat >> 3) as i64;
            self.iat = (self.iat as i64 + err).max(0) as Ticks;
            let err = err.abs() - (self.iat_mdev >> 2) as i64;
            self.iat_mdev = (self.iat_mdev as i64 + err).max(0) as Ticks;
            self.ato = ((self.iat >> 3) + (self.iat_mdev >> 2)).max(MIN_ATO);
        } else {
            self.ato = 0;
        }
    }

    /// Doubles the timeout after an unanswered retransmission or probe.
    pub fn back_off(&mut self) {
        self.backoff = (self.backoff + 1).min(MAX_BACKOFF);
    }

    /// Forgets the backoff, e.g. once a probed window opens.
    pub fn reset_backoff(&mut self) {
        self.backoff = 0;
    }

    /// The retransmission timeout including backoff, never more than
    /// [`MAX_RTO`].
    pub fn timeout(&self) -> Ticks {
        self.rto
            .checked_shl(self.backoff)
            .unwrap_or(MAX_RTO)
            .min(MAX_RTO)
    }

    /// The retransmission timeout without backoff.
    pub fn rto(&self) -> Ticks {
        self.rto
    }

    pub fn srtt(&self) -> Ticks {
        self.srtt
    }

    pub fn mdev(&self) -> Ticks {
        self.mdev
    }

    pub fn backoff(&self) -> u32 {
        self.backoff
    }

    pub fn ato(&self) -> Ticks {
        self.ato
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_the_estimate() {
        let mut rtt = RttEstimator::default();
        rtt.sample(10);
        assert_eq!(rtt.srtt(), 80);
        assert_eq!(rtt.mdev(), 40);
        assert_eq!(rtt.rto(), 50);
    }

    #[test]
    fn smoothing() {
        let mut rtt = RttEstimator::default();
        rtt.sample(10);
        rtt.sample(18);
        // err = 18 - 10 = 8, srtt = 88, mdev = 40 + 8 - 10 = 38
        assert_eq!(rtt.srtt(), 88);
        assert_eq!(rtt.mdev(), 38);
        assert_eq!(rtt.rto(), 11 + 38);
    }

    #[test]
    fn rto_is_bounded() {
        let mut rtt = RttEstimator::default();
        rtt.sample(0);
        assert_eq!(rtt.rto(), MIN_RTO);
        for measured in [1, 2, 500_000, 3, 0, 90_000] {
            rtt.sample(measured);
            assert!((MIN_RTO..=MAX_RTO).contains(&rtt.rto()));
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut rtt = RttEstimator::default();
        rtt.sample(10);
        let rto = rtt.timeout();
        rtt.back_off();
        assert_eq!(rtt.timeout(), rto * 2);
        for _ in 0..40 {
            rtt.back_off();
        }
        assert_eq!(rtt.timeout(), MAX_RTO);
        rtt.sample(10);
        assert_eq!(rtt.backoff(), 0);
    }

    #[test]
    fn delayed_ack_estimate() {
        let mut rtt = RttEstimator::default();
        rtt.sample(40);
        rtt.delack_sample(100);
        assert_eq!(rtt.ato(), INITIAL_ATO);
        rtt.delack_sample(108);
        // iat = 8, iat_mdev = 8, ato = 1 + 2
        assert_eq!(rtt.ato(), MIN_ATO.max(3));
        // A long silence resets the estimate
        rtt.delack_sample(1000);
        assert_eq!(rtt.ato(), 0);
    }
}
