use std::fmt;

/// Time on the engine's monotonic clock, counted in ticks.
pub type Ticks = u64;

/// Ticks per second.
pub const HZ: Ticks = 100;

/// The kinds of timer a connection can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Retransmit the oldest unacknowledged segment
    Retransmit,
    /// Probe a zero window
    Probe0,
    /// Probe an idle connection
    Keepalive,
    /// Send an acknowledgment that was held back
    DelayedAck,
    /// Leave TIME-WAIT
    TimeWait,
}

impl TimerKind {
    /// Whether the timer occupies the single transmission timer slot
    pub fn is_transmission(self) -> bool {
        matches!(
            self,
            TimerKind::Retransmit | TimerKind::Probe0 | TimerKind::Keepalive
        )
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TimerKind::Retransmit => "retransmit",
            TimerKind::Probe0 => "probe0",
            TimerKind::Keepalive => "keepalive",
            TimerKind::DelayedAck => "delayed-ack",
            TimerKind::TimeWait => "time-wait",
        };
        write!(f, "{name}")
    }
}

/// A request for the collaborator's timer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    /// Arm the timer to fire `after` ticks from now, replacing any timer of the
    /// same kind
    Arm { kind: TimerKind, after: Ticks },
    /// Cancel the timer
    Cancel(TimerKind),
}

/// Deadlines for every timer the connection has armed. Retransmit, Probe0 and
/// Keepalive share one slot, so at most one of them is pending.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Timers {
    pending: Option<(TimerKind, Ticks)>,
    delayed_ack: Option<Ticks>,
    time_wait: Option<Ticks>,
}

impl Timers {
    /// Arms a timer, replacing the previous one of the same slot.
    pub fn arm(&mut self, kind: TimerKind, deadline: Ticks) {
        match kind {
            TimerKind::Retransmit | TimerKind::Probe0 | TimerKind::Keepalive => {
                self.pending = Some((kind, deadline))
            }
            TimerKind::DelayedAck => self.delayed_ack = Some(deadline),
            TimerKind::TimeWait => self.time_wait = Some(deadline),
        }
    }

    /// Cancels the timer, returning whether it was armed.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Retransmit | TimerKind::Probe0 | TimerKind::Keepalive => {
                if self.pending_kind() != Some(kind) {
                    return false;
                }
                self.pending.take().is_some()
            }
            TimerKind::DelayedAck => self.delayed_ack.take().is_some(),
            TimerKind::TimeWait => self.time_wait.take().is_some(),
        }
    }

    /// The kind of transmission timer pending, if any.
    pub fn pending_kind(&self) -> Option<TimerKind> {
        self.pending.map(|(kind, _)| kind)
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadline(kind).is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Ticks> {
        match kind {
            TimerKind::Retransmit | TimerKind::Probe0 | TimerKind::Keepalive => self
                .pending
                .filter(|(pending, _)| *pending == kind)
                .map(|(_, deadline)| deadline),
            TimerKind::DelayedAck => self.delayed_ack,
            TimerKind::TimeWait => self.time_wait,
        }
    }

    /// Removes and returns the timers that expired at or before `now`, in the
    /// order they should be handled.
    pub fn expired(&mut self, now: Ticks) -> Vec<TimerKind> {
        let mut expired = vec![];
        if self.time_wait.map_or(false, |deadline| deadline <= now) {
            self.time_wait = None;
            expired.push(TimerKind::TimeWait);
        }
        if let Some((kind, deadline)) = self.pending {
            if deadline <= now {
                self.pending = None;
                expired.push(kind);
            }
        }
        if self.delayed_ack.map_or(false, |deadline| deadline <= now) {
            self.delayed_ack = None;
            expired.push(TimerKind::DelayedAck);
        }
        expired
    }

    /// The earliest deadline of any armed timer.
    pub fn next_deadline(&self) -> Option<Ticks> {
        [
            self.pending.map(|(_, deadline)| deadline),
            self.delayed_ack,
            self.time_wait,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
