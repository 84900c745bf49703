use super::{
    tcb::{
        Action, AdvanceTimeResult, CloseError, ConnectionError, SegmentArrivesResult, SendError,
        State, Tcb, Ticks,
    },
    ConnectionId, Segment,
};
use crate::Message;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One connection in the registry. Serializes segment arrivals, user calls and
/// timer expirations on the control block.
#[derive(Debug)]
pub struct TcpSession {
    id: ConnectionId,
    tcb: Mutex<Tcb>,
}

/// The result of one call into a session together with the actions it
/// produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<T> {
    pub result: T,
    pub actions: Vec<Action>,
}

impl TcpSession {
    /// Create a new TCP session
    pub fn new(tcb: Tcb) -> Arc<Self> {
        Arc::new(Self {
            id: tcb.id(),
            tcb: Mutex::new(tcb),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receive an incoming segment as part of the demux flow
    pub fn segment_arrives(
        &self,
        segment: Segment,
        now: Ticks,
    ) -> Step<Result<SegmentArrivesResult, ConnectionError>> {
        self.step(|tcb| tcb.segment_arrives(segment, now))
    }

    pub fn send(&self, text: Message, now: Ticks) -> Step<Result<(), SendError>> {
        self.step(|tcb| tcb.send(text, now))
    }

    pub fn close(&self, now: Ticks) -> Step<Result<(), CloseError>> {
        self.step(|tcb| tcb.close(now))
    }

    /// Drains the data received so far
    pub fn receive(&self) -> Step<Message> {
        self.step(Tcb::receive)
    }

    pub fn advance_time(&self, now: Ticks) -> Step<Result<AdvanceTimeResult, ConnectionError>> {
        self.step(|tcb| tcb.advance_time(now))
    }

    pub fn state(&self) -> State {
        self.tcb().state()
    }

    pub fn next_deadline(&self) -> Option<Ticks> {
        self.tcb().next_deadline()
    }

    /// Runs `f` with the control block locked, for inspection.
    pub fn inspect<R>(&self, f: impl FnOnce(&Tcb) -> R) -> R {
        f(&*self.tcb())
    }

    fn step<T>(&self, f: impl FnOnce(&mut Tcb) -> T) -> Step<T> {
        let mut tcb = self.tcb();
        let result = f(&mut *tcb);
        Step {
            result,
            actions: tcb.actions(),
        }
    }

    fn tcb(&self) -> MutexGuard<'_, Tcb> {
        // Keep serving the connection after a panic in another caller
        self.tcb.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
