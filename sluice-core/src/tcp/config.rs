use super::tcb::{
    congestion::{CongestionAlgorithm, INITIAL_SSTHRESH},
    timers::{Ticks, HZ},
};
use std::time::Duration;

/// The default maximum segment size, the smallest every IPv4 host accepts
pub const DEFAULT_MSS: u32 = 536;
/// The default receive buffer in octets
pub const DEFAULT_RECEIVE_BUFFER: usize = 32 * 1024;
/// Maximum segment lifetime
pub const MSL: Ticks = 60 * HZ;

/// Per-connection tunables, handed to the control block when it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Maximum segment size in octets, as negotiated by the handshake
    pub mss: u32,
    /// Congestion window at establishment, in segments
    pub initial_cwnd: u32,
    /// Slow start threshold at establishment, in segments
    pub initial_ssthresh: u32,
    pub congestion: CongestionAlgorithm,
    /// Octets of received data the connection buffers for the application
    pub receive_buffer: usize,
    /// Retransmission timeouts tolerated before the connection is aborted
    pub max_retries: u32,
    /// Unanswered zero window or keepalive probes tolerated before the
    /// connection is aborted
    pub max_probes: u32,
    /// Idle time before keepalive probes start. `None` disables keepalive.
    pub keepalive: Option<Ticks>,
    /// How long TIME-WAIT lasts
    pub time_wait: Ticks,
    /// Wall clock duration of one tick for the async driver
    pub tick: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            initial_cwnd: 1,
            initial_ssthresh: INITIAL_SSTHRESH,
            congestion: CongestionAlgorithm::Classic,
            receive_buffer: DEFAULT_RECEIVE_BUFFER,
            max_retries: 15,
            max_probes: 9,
            keepalive: None,
            time_wait: 2 * MSL,
            tick: Duration::from_millis(1000 / HZ),
        }
    }
}

impl TcpConfig {
    pub fn mss(mut self, mss: u32) -> Self {
        self.mss = mss.max(1);
        self
    }

    pub fn initial_cwnd(mut self, cwnd: u32) -> Self {
        self.initial_cwnd = cwnd;
        self
    }

    pub fn initial_ssthresh(mut self, ssthresh: u32) -> Self {
        self.initial_ssthresh = ssthresh;
        self
    }

    pub fn congestion(mut self, algorithm: CongestionAlgorithm) -> Self {
        self.congestion = algorithm;
        self
    }

    pub fn receive_buffer(mut self, octets: usize) -> Self {
        self.receive_buffer = octets;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn max_probes(mut self, probes: u32) -> Self {
        self.max_probes = probes;
        self
    }

    pub fn keepalive(mut self, idle: Option<Ticks>) -> Self {
        self.keepalive = idle;
        self
    }

    pub fn time_wait(mut self, ticks: Ticks) -> Self {
        self.time_wait = ticks;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}
