//! The transmission control block. Holds the state of one connection and
//! processes its incoming segments, user calls and timer expirations.
//!
//! The control block never performs I/O. Every segment to put on the wire,
//! every timer to arm and every notification for the application is queued as
//! an [`Action`] for the owner to collect with [`Tcb::actions`].

use super::{ConnectionId, TcpConfig};
use crate::{logging, Message};
use std::fmt;

pub mod congestion;
pub mod fast_retransmit;
pub mod incoming;
pub mod modular_cmp;
pub mod outgoing;
pub mod receive_sequence_space;
pub mod rtt;
pub mod segment;
pub mod send_sequence_space;
pub mod state;
pub mod timers;


use congestion::{AckEvent, CongestionAlgorithm, CongestionAvoidance, CongestionWindow, Strategy};
use fast_retransmit::{FastRetransmit, FastRetransmitOutcome};
use incoming::{trim_front, Incoming};
use modular_cmp::{after, before, in_window};
use outgoing::Outgoing;
use receive_sequence_space::ReceiveSequenceSpace;
use rtt::RttEstimator;
use send_sequence_space::SendSequenceSpace;
use state::FinTransition;
use timers::Timers;

pub use segment::{Control, Segment, SegmentBuilder};
pub use state::State;
pub use timers::{Ticks, TimerKind, TimerRequest, HZ};

/// The interval between keepalive probes once the first one went unanswered
pub const KEEPALIVE_PROBE_INTERVAL: Ticks = 75 * HZ;

/// The outcome of the handshake that created the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Our initial sequence number
    pub iss: u32,
    /// The remote TCP's initial sequence number
    pub irs: u32,
    /// The window carried by the remote TCP's SYN
    pub peer_window: u16,
}

/// Work produced by the control block for its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a segment that acknowledges received data and carries nothing else
    SendAck(Segment),
    /// An acknowledgment is being held back for `delay` ticks
    ScheduleAck { delay: Ticks },
    /// Send a new segment
    Transmit(Segment),
    /// Send a segment from the retransmission queue again
    Retransmit(Segment),
    /// Probe a zero window
    WindowProbe(Segment),
    /// Probe an idle connection
    KeepAlive(Segment),
    /// Urgent data ends before `seq`
    Urgent { seq: u32 },
    /// The connection changed state
    StateChange { from: State, to: State },
    /// Arm or cancel a timer
    Timer(TimerRequest),
    /// `bytes` more octets are ready for [`Tcb::receive`]
    Readable { bytes: usize },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::SendAck(seg) => write!(f, "ack {seg}"),
            Action::ScheduleAck { delay } => write!(f, "delay ack {delay}"),
            Action::Transmit(seg) => write!(f, "transmit {seg}"),
            Action::Retransmit(seg) => write!(f, "retransmit {seg}"),
            Action::WindowProbe(seg) => write!(f, "window probe {seg}"),
            Action::KeepAlive(seg) => write!(f, "keepalive {seg}"),
            Action::Urgent { seq } => write!(f, "urgent mark {seq}"),
            Action::StateChange { from, to } => write!(f, "state {from} -> {to}"),
            Action::Timer(TimerRequest::Arm { kind, after }) => write!(f, "arm {kind} +{after}"),
            Action::Timer(TimerRequest::Cancel(kind)) => write!(f, "cancel {kind}"),
            Action::Readable { bytes } => write!(f, "readable {bytes}"),
        }
    }
}

/// How an incoming acknowledgment relates to the send sequence space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// New data was acknowledged
    Accepted,
    /// SND.UNA was acknowledged again
    Duplicate,
    /// An acknowledgment older than SND.UNA
    Stale,
    /// An acknowledgment for something not yet sent
    Unsent,
}

#[derive(Debug)]
pub struct Tcb {
    id: ConnectionId,
    config: TcpConfig,
    state: State,
    snd: SendSequenceSpace,
    rcv: ReceiveSequenceSpace,
    rtt: RttEstimator,
    window: CongestionWindow,
    strategy: Strategy,
    fast: FastRetransmit,
    /// Retransmissions since new data was last acknowledged without one
    retransmits: u32,
    /// Unanswered zero window or keepalive probes
    probes_out: u32,
    timers: Timers,
    outgoing: Outgoing,
    incoming: Incoming,
    /// In-order data not yet read by the application
    received: Message,
    /// The application closed the connection. A FIN follows the queued text.
    fin_queued: bool,
    /// The sequence number of our FIN once it has been sent
    fin_seq: Option<u32>,
    /// The urgent mark last announced by the remote TCP
    urgent: Option<u32>,
    /// The header word expected on the next segment, if the fast path is open
    pred_flags: Option<u32>,
    /// In-order data segments received since the last acknowledgment
    delayed_acks: u32,
    now: Ticks,
    actions: Vec<Action>,
}

impl Tcb {
    /// Creates the control block for a connection whose handshake just
    /// completed.
    pub fn established(
        id: ConnectionId,
        handshake: Handshake,
        config: TcpConfig,
        now: Ticks,
    ) -> Self {
        let Handshake {
            iss,
            irs,
            peer_window,
        } = handshake;
        let snd_nxt = iss.wrapping_add(1);
        let rcv_nxt = irs.wrapping_add(1);
        let mut tcb = Self {
            id,
            state: State::Established,
            snd: SendSequenceSpace {
                una: snd_nxt,
                nxt: snd_nxt,
                wnd: peer_window as u32,
                wl1: irs,
                wl2: snd_nxt,
                max_wnd: peer_window as u32,
                iss,
            },
            rcv: ReceiveSequenceSpace {
                irs,
                nxt: rcv_nxt,
                wnd: 0,
                wup: rcv_nxt,
            },
            rtt: RttEstimator::default(),
            window: CongestionWindow::new(config.initial_cwnd, config.initial_ssthresh),
            strategy: config.congestion.into(),
            // No loss episode yet, so duplicates of SND.UNA already count
            fast: FastRetransmit::new(iss),
            retransmits: 0,
            probes_out: 0,
            timers: Timers::default(),
            outgoing: Outgoing::default(),
            incoming: Incoming::default(),
            received: Message::default(),
            fin_queued: false,
            fin_seq: None,
            urgent: None,
            pred_flags: None,
            delayed_acks: 0,
            now,
            actions: vec![],
            config,
        };
        tcb.rcv.wnd = tcb.advertised_window();
        tcb.settle_timers();
        tcb.update_prediction();
        tracing::debug!(
            local = %id.local,
            remote = %id.remote,
            iss,
            irs,
            "Connection established"
        );
        tcb
    }

    /// Queues text for transmission and sends as much as the windows allow.
    pub fn send(&mut self, text: Message, now: Ticks) -> Result<(), SendError> {
        self.now = now;
        if !self.state.accepts_send() || self.fin_queued {
            return Err(SendError::InvalidState(self.state));
        }
        self.outgoing.text.concatenate(text);
        self.transmit_queued();
        self.settle_timers();
        Ok(())
    }

    /// Closes our half of the connection. The FIN follows any queued text.
    pub fn close(&mut self, now: Ticks) -> Result<(), CloseError> {
        self.now = now;
        if self.fin_queued {
            return Err(CloseError::InvalidState(self.state));
        }
        let next = self
            .state
            .close_requested()
            .ok_or(CloseError::InvalidState(self.state))?;
        self.fin_queued = true;
        self.transition(next);
        self.transmit_queued();
        self.settle_timers();
        self.update_prediction();
        Ok(())
    }

    /// Hands the application every in-order octet received so far. Announces
    /// the reopened window if it was nearly closed.
    pub fn receive(&mut self) -> Message {
        let received = std::mem::take(&mut self.received);
        if !received.is_empty()
            && self.state.accepts_text()
            && self.rcv.remaining() < self.config.mss
            && self.advertised_window() >= self.config.mss
        {
            self.send_ack();
        }
        received
    }

    /// Takes the work queued since the last call.
    pub fn actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    /// Processes an incoming segment.
    pub fn segment_arrives(
        &mut self,
        seg: Segment,
        now: Ticks,
    ) -> Result<SegmentArrivesResult, ConnectionError> {
        self.now = now;
        if self.state == State::Closed {
            return Ok(SegmentArrivesResult::Close);
        }
        if self.timers.pending_kind() == Some(TimerKind::Keepalive) {
            self.probes_out = 0;
            if let Some(idle) = self.config.keepalive {
                self.arm_timer(TimerKind::Keepalive, idle);
            }
        }

        if self.pred_flags == Some(seg.prediction_word()) && seg.seq == self.rcv.nxt {
            match self.fast_path(seg) {
                Ok(result) => return Ok(result),
                Err(seg) => return self.slow_path(seg),
            }
        }
        self.slow_path(seg)
    }

    /// Handles the common cases of a pure acknowledgment, or in-order data
    /// acknowledging nothing new, on an established connection. Hands the
    /// segment back if it needs the full treatment.
    fn fast_path(&mut self, seg: Segment) -> Result<SegmentArrivesResult, Segment> {
        if seg.text.is_empty() {
            tracing::trace!(ack = seg.ack, "Predicted acknowledgment");
            if self.process_ack(&seg) == AckOutcome::Unsent {
                self.send_ack();
            }
            self.transmit_queued();
            self.settle_timers();
            self.update_prediction();
            return Ok(SegmentArrivesResult::Ok);
        }

        let len = seg.text.len();
        if seg.ack != self.snd.una
            || len as u32 > self.rcv.remaining()
            || self.unread() + len > self.config.receive_buffer
        {
            return Err(seg);
        }
        tracing::trace!(seq = seg.seq, len, "Predicted data");
        self.rtt.delack_sample(self.now);
        self.received.concatenate(seg.text);
        self.rcv.nxt = self.rcv.nxt.wrapping_add(len as u32);
        self.delayed_acks += 1;
        self.actions.push(Action::Readable { bytes: len });
        self.ack_check(false);
        Ok(SegmentArrivesResult::Ok)
    }

    fn slow_path(&mut self, mut seg: Segment) -> Result<SegmentArrivesResult, ConnectionError> {
        // A retransmitted FIN means our last ACK was lost
        if self.state == State::TimeWait && seg.ctl.fin() && !seg.ctl.rst() {
            self.restart_time_wait();
            self.send_ack();
            return Ok(SegmentArrivesResult::Ok);
        }

        // First, check the sequence number
        if !in_window(seg.seq, seg.end_seq(), self.rcv.nxt, self.rcv.remaining()) {
            tracing::debug!(
                seq = seg.seq,
                len = seg.seg_len(),
                rcv_nxt = self.rcv.nxt,
                "Unacceptable segment"
            );
            if !seg.ctl.rst() {
                self.send_ack();
            }
            return Ok(SegmentArrivesResult::Ok);
        }

        // Second, check the RST bit
        if seg.ctl.rst() {
            let from = self.state;
            tracing::info!(state = %from, "Connection reset by peer");
            self.transition(State::Closed);
            return Err(ConnectionError::from_reset(from));
        }

        // Fourth, check the SYN bit. The third step, security, is not
        // implemented.
        if seg.ctl.syn() {
            if seg.seq != self.rcv.irs {
                tracing::debug!(seq = seg.seq, "SYN in a synchronized state");
            }
            self.send_ack();
            return Ok(SegmentArrivesResult::Ok);
        }

        // Fifth, check the ACK field
        if !seg.ctl.ack() {
            return Ok(SegmentArrivesResult::Ok);
        }
        match self.process_ack(&seg) {
            AckOutcome::Unsent => {
                self.send_ack();
                return Ok(SegmentArrivesResult::Ok);
            }
            AckOutcome::Accepted | AckOutcome::Duplicate | AckOutcome::Stale => {}
        }
        if let Some(fin_seq) = self.fin_seq {
            if !before(self.snd.una, fin_seq.wrapping_add(1)) {
                if let Some(next) = self.state.fin_acknowledged() {
                    self.transition(next);
                    if next == State::Closed {
                        return Ok(SegmentArrivesResult::Close);
                    }
                }
            }
        }

        // Sixth, check the URG bit
        if seg.ctl.urg() && self.state.accepts_text() {
            self.check_urgent(&seg);
        }

        // Seventh, process the segment text, and eighth, the FIN bit
        let mut force_ack = false;
        if seg.seg_len() > 0 {
            if self.state.accepts_text() {
                self.trim_to_window(&mut seg);
                force_ack = self.data_queue(seg);
            } else {
                // Text and FIN after the remote FIN are duplicates
                force_ack = true;
            }
        }

        self.transmit_queued();
        self.ack_check(force_ack);
        self.settle_timers();
        self.update_prediction();
        if self.state == State::Closed {
            Ok(SegmentArrivesResult::Close)
        } else {
            Ok(SegmentArrivesResult::Ok)
        }
    }

    /// Applies the acknowledgment and window of a segment to the send side.
    fn process_ack(&mut self, seg: &Segment) -> AckOutcome {
        let ack = seg.ack;
        if after(ack, self.snd.nxt) {
            tracing::debug!(ack, snd_nxt = self.snd.nxt, "Acknowledgment for unsent data");
            return AckOutcome::Unsent;
        }
        if before(ack, self.snd.una) {
            return AckOutcome::Stale;
        }

        let mut not_dup = !seg.text.is_empty();
        if before(self.snd.wl1, seg.seq) || (self.snd.wl1 == seg.seq && !after(self.snd.wl2, ack))
        {
            let wnd = seg.wnd as u32;
            if self.snd.wl2 != ack || wnd > self.snd.wnd {
                not_dup = true;
                self.snd.wnd = wnd;
                self.snd.wl1 = seg.seq;
                self.snd.wl2 = ack;
                self.snd.max_wnd = self.snd.max_wnd.max(wnd);
            }
        }

        if self.timers.pending_kind() == Some(TimerKind::Probe0) && self.snd.wnd > 0 {
            self.cancel_timer(TimerKind::Probe0);
            self.rtt.reset_backoff();
            self.probes_out = 0;
        }

        let snd_una = self.snd.una;
        let cleaned = self.outgoing.clean(ack);
        if self.retransmits != 0 {
            if self.outgoing.packets_out() == 0 {
                self.retransmits = 0;
            }
        } else if let (Some(sent_at), false) = (cleaned.first_sent_at, cleaned.first_retransmitted)
        {
            let rtt = self.now.saturating_sub(sent_at);
            self.rtt.sample(rtt);
            let event = AckEvent {
                seq: snd_una,
                ack,
                rtt,
                snd_nxt: self.snd.nxt,
                mss: self.config.mss,
            };
            self.strategy.on_ack(&mut self.window, &event);
            tracing::trace!(
                cwnd = self.window.cwnd,
                ssthresh = self.window.ssthresh,
                "Congestion avoidance"
            );
        }

        if cleaned.removed > 0 {
            self.rearm_retransmit();
        }

        match self.fast.on_ack(
            &mut self.window,
            ack,
            snd_una,
            self.outgoing.packets_out(),
            not_dup,
        ) {
            FastRetransmitOutcome::Retransmit => {
                self.retransmits += 1;
                logging::congestion_event(
                    self.id,
                    self.window.cwnd,
                    self.window.ssthresh,
                    "fast retransmit",
                );
                self.retransmit_head("fast retransmit");
            }
            FastRetransmitOutcome::Deflated => {
                self.retransmits = 0;
                logging::congestion_event(
                    self.id,
                    self.window.cwnd,
                    self.window.ssthresh,
                    "fast recovery",
                );
            }
            FastRetransmitOutcome::Counted(_)
            | FastRetransmitOutcome::Inflated
            | FastRetransmitOutcome::Reset => {}
        }

        self.snd.una = ack;
        if ack == snd_una {
            AckOutcome::Duplicate
        } else {
            AckOutcome::Accepted
        }
    }

    /// Re-arms the retransmission timer after segments left the queue,
    /// counting from when the new head was sent.
    fn rearm_retransmit(&mut self) {
        let Some(sent_at) = self.outgoing.head().map(|head| head.sent_at) else {
            self.cancel_timer(TimerKind::Retransmit);
            return;
        };
        let timeout = self.rtt.timeout();
        let elapsed = self.now.saturating_sub(sent_at);
        if elapsed >= timeout {
            self.retransmit_head("overdue");
            self.arm_timer(TimerKind::Retransmit, timeout);
        } else {
            self.arm_timer(TimerKind::Retransmit, timeout - elapsed);
        }
    }

    fn check_urgent(&mut self, seg: &Segment) {
        let mark = seg.seq.wrapping_add(seg.urg as u32);
        if before(mark, self.rcv.nxt) {
            return;
        }
        if let Some(current) = self.urgent {
            if !after(mark, current) {
                return;
            }
        }
        tracing::debug!(mark, "Urgent data announced");
        self.urgent = Some(mark);
        self.actions.push(Action::Urgent { seq: mark });
    }

    /// Drops whatever part of the segment lies past the right edge of the
    /// receive window. A FIN past the edge is dropped with it.
    fn trim_to_window(&self, seg: &mut Segment) {
        let right_edge = self.rcv.nxt.wrapping_add(self.rcv.remaining());
        if !after(seg.end_seq(), right_edge) {
            return;
        }
        let room = right_edge.wrapping_sub(seg.seq) as usize;
        tracing::debug!(
            seq = seg.seq,
            len = seg.text.len(),
            room,
            "Trimming segment to the receive window"
        );
        seg.text.truncate(room);
        seg.ctl.set_fin(false);
    }

    /// Places segment text in the receive queue or the reassembly queue.
    /// Returns whether the segment must be acknowledged immediately.
    fn data_queue(&mut self, mut seg: Segment) -> bool {
        if !seg.text.is_empty() {
            self.rtt.delack_sample(self.now);
        }

        if !after(seg.end_seq(), self.rcv.nxt) {
            tracing::debug!(seq = seg.seq, "Duplicate segment");
            return true;
        }

        if after(seg.seq, self.rcv.nxt) {
            tracing::debug!(
                seq = seg.seq,
                rcv_nxt = self.rcv.nxt,
                "Out of order segment"
            );
            self.incoming.insert(seg);
            self.prune();
            return true;
        }

        // In order, possibly with a duplicate prefix
        trim_front(&mut seg, self.rcv.nxt);
        let filled_hole = !self.incoming.is_empty();
        let mut readable = 0;
        let mut fin = self.queue_in_order(seg, &mut readable);
        while !fin {
            let Some(next) = self.incoming.next_in_order(self.rcv.nxt) else {
                break;
            };
            fin = self.queue_in_order(next, &mut readable);
        }
        if readable > 0 {
            self.delayed_acks += 1;
            self.actions.push(Action::Readable { bytes: readable });
        }
        filled_hole || fin
    }

    /// Appends an in-order segment to the receive queue and processes its FIN.
    /// Returns whether the segment carried a FIN.
    fn queue_in_order(&mut self, seg: Segment, readable: &mut usize) -> bool {
        debug_assert_eq!(seg.seq, self.rcv.nxt);
        let len = seg.text.len();
        if len > 0 {
            self.received.concatenate(seg.text);
            self.rcv.nxt = self.rcv.nxt.wrapping_add(len as u32);
            *readable += len;
        }
        if seg.ctl.fin() {
            self.rcv.nxt = self.rcv.nxt.wrapping_add(1);
            self.incoming.clear();
            self.fin_received();
            return true;
        }
        false
    }

    fn fin_received(&mut self) {
        match self.state.fin_received() {
            FinTransition::Enter(next) => self.transition(next),
            FinTransition::RestartTimeWait => self.restart_time_wait(),
            FinTransition::Ignore => {}
        }
    }

    /// Frees reassembly space while the receive buffer is overcommitted.
    /// Received in-order data is never dropped.
    fn prune(&mut self) {
        let limit = self.config.receive_buffer.saturating_sub(self.received.len());
        let dropped = self.incoming.prune(limit);
        if dropped > 0 {
            tracing::warn!(dropped, limit, "Pruned the reassembly queue");
        }
    }

    /// Sends queued text, and the FIN after it, as far as the congestion and
    /// send windows allow.
    fn transmit_queued(&mut self) {
        let mut sent = false;
        loop {
            let fin_pending = self.fin_queued && self.fin_seq.is_none();
            if self.outgoing.text.is_empty() && !fin_pending {
                break;
            }
            if self.outgoing.packets_out() >= self.window.cwnd as usize {
                break;
            }
            let len = (self.config.mss as usize)
                .min(self.outgoing.text.len())
                .min(self.snd.usable_window() as usize);
            if len == 0 && !self.outgoing.text.is_empty() {
                break;
            }

            let text = self.outgoing.text.cut(len);
            let mut builder = Segment::builder(self.snd.nxt)
                .ack(self.rcv.nxt)
                .wnd(self.window_field())
                .text(text);
            if self.outgoing.text.is_empty() {
                builder = builder.psh();
                if fin_pending {
                    builder = builder.fin();
                }
            }
            let seg = builder.build();
            self.snd.nxt = seg.end_seq();
            if seg.ctl.fin() {
                self.fin_seq = Some(seg.end_seq().wrapping_sub(1));
            }
            tracing::trace!(seq = seg.seq, len = seg.seg_len(), "Transmitting");
            self.outgoing.push(seg.clone(), self.now);
            self.actions.push(Action::Transmit(seg));
            if self.timers.pending_kind() != Some(TimerKind::Retransmit) {
                self.arm_timer(TimerKind::Retransmit, self.rtt.timeout());
            }
            sent = true;
        }
        if sent {
            self.ack_sent();
        }
    }

    /// Sends the oldest unacknowledged segment again.
    fn retransmit_head(&mut self, reason: &str) {
        let ack = self.rcv.nxt;
        let wnd = self.window_field();
        let Some(head) = self.outgoing.retransmit_head(self.now) else {
            return;
        };
        let mut seg = head.clone();
        seg.ack = ack;
        seg.ctl.set_ack(true);
        seg.wnd = wnd;
        logging::retransmit_event(self.id, seg.seq, seg.seg_len(), reason, self.retransmits);
        self.actions.push(Action::Retransmit(seg));
        self.ack_sent();
    }

    /// Sends or schedules the acknowledgment for received data.
    fn ack_check(&mut self, force: bool) {
        if force {
            self.send_ack();
            return;
        }
        if self.delayed_acks == 0 {
            return;
        }
        let ato = self.rtt.ato();
        if self.delayed_acks >= 2 || ato == 0 {
            self.send_ack();
        } else if !self.timers.is_armed(TimerKind::DelayedAck) {
            self.arm_timer(TimerKind::DelayedAck, ato);
            self.actions.push(Action::ScheduleAck { delay: ato });
        }
    }

    fn send_ack(&mut self) {
        let seg = Segment::builder(self.snd.nxt)
            .ack(self.rcv.nxt)
            .wnd(self.window_field())
            .build();
        self.actions.push(Action::SendAck(seg));
        self.ack_sent();
    }

    /// Bookkeeping for any segment that carried our current acknowledgment
    /// and window.
    fn ack_sent(&mut self) {
        self.delayed_acks = 0;
        self.cancel_timer(TimerKind::DelayedAck);
        self.rcv.wnd = self.advertised_window();
        self.rcv.wup = self.rcv.nxt;
    }

    /// Octets the application has not read yet
    fn unread(&self) -> usize {
        self.received.len()
    }

    fn advertised_window(&self) -> u32 {
        self.config
            .receive_buffer
            .saturating_sub(self.unread())
            .min(u16::MAX as usize) as u32
    }

    fn window_field(&self) -> u16 {
        self.advertised_window() as u16
    }

    /// Makes sure the right transmission timer is pending: retransmission
    /// while data is in flight, a zero window probe while data waits for the
    /// window to open, otherwise keepalive if enabled.
    fn settle_timers(&mut self) {
        let pending = self.timers.pending_kind();
        let waiting = !self.outgoing.text.is_empty() || (self.fin_queued && self.fin_seq.is_none());
        if self.state == State::TimeWait || self.state == State::Closed {
            return;
        }
        if self.outgoing.packets_out() > 0 {
            if pending != Some(TimerKind::Retransmit) {
                self.arm_timer(TimerKind::Retransmit, self.rtt.timeout());
            }
        } else if waiting && self.snd.usable_window() == 0 {
            if pending != Some(TimerKind::Probe0) {
                self.arm_timer(TimerKind::Probe0, self.rtt.timeout());
            }
        } else if let Some(idle) = self.config.keepalive {
            if pending != Some(TimerKind::Keepalive) {
                self.arm_timer(TimerKind::Keepalive, idle);
            }
        } else if let Some(kind) = pending {
            self.cancel_timer(kind);
        }
    }

    /// Handles every timer that expired at or before `now`.
    pub fn advance_time(&mut self, now: Ticks) -> Result<AdvanceTimeResult, ConnectionError> {
        self.now = now;
        let mut result = AdvanceTimeResult::Idle;
        for kind in self.timers.expired(now) {
            match kind {
                TimerKind::TimeWait => {
                    self.transition(State::Closed);
                    return Ok(AdvanceTimeResult::Close);
                }
                TimerKind::Retransmit => {
                    if let Some(attempt) = self.retransmit_timeout()? {
                        result = AdvanceTimeResult::Retry { attempt };
                    }
                }
                TimerKind::Probe0 => {
                    let attempt = self.probe(TimerKind::Probe0)?;
                    result = AdvanceTimeResult::Retry { attempt };
                }
                TimerKind::Keepalive => {
                    let attempt = self.probe(TimerKind::Keepalive)?;
                    result = AdvanceTimeResult::Retry { attempt };
                }
                TimerKind::DelayedAck => {
                    if self.delayed_acks > 0 {
                        self.send_ack();
                    }
                }
            }
        }
        self.settle_timers();
        Ok(result)
    }

    /// Retransmits the oldest segment after the retransmission timer expired
    /// and returns the attempt number, or aborts the connection once the
    /// retries are exhausted.
    fn retransmit_timeout(&mut self) -> Result<Option<u32>, ConnectionError> {
        if self.outgoing.head().is_none() {
            return Ok(None);
        }
        self.retransmits += 1;
        if self.retransmits > self.config.max_retries {
            return Err(self.abort(ConnectionError::TimedOut));
        }
        self.window.on_timeout();
        self.fast.on_timeout(self.snd.nxt);
        logging::congestion_event(
            self.id,
            self.window.cwnd,
            self.window.ssthresh,
            "retransmission timeout",
        );
        self.retransmit_head("timeout");
        self.rtt.back_off();
        self.arm_timer(TimerKind::Retransmit, self.rtt.timeout());
        Ok(Some(self.retransmits))
    }

    /// Sends a zero window or keepalive probe. The probe repeats the last
    /// acknowledged octet so the remote TCP answers with its current window.
    fn probe(&mut self, kind: TimerKind) -> Result<u32, ConnectionError> {
        self.probes_out += 1;
        if self.probes_out > self.config.max_probes {
            return Err(self.abort(ConnectionError::TimedOut));
        }
        let seg = Segment::builder(self.snd.una.wrapping_sub(1))
            .ack(self.rcv.nxt)
            .wnd(self.window_field())
            .build();
        if kind == TimerKind::Probe0 {
            self.actions.push(Action::WindowProbe(seg));
            self.rtt.back_off();
            self.arm_timer(TimerKind::Probe0, self.rtt.timeout());
        } else {
            self.actions.push(Action::KeepAlive(seg));
            self.arm_timer(TimerKind::Keepalive, KEEPALIVE_PROBE_INTERVAL);
        }
        self.ack_sent();
        Ok(self.probes_out)
    }

    fn abort(&mut self, error: ConnectionError) -> ConnectionError {
        tracing::warn!(state = %self.state, "Aborting connection: {error}");
        self.transition(State::Closed);
        error
    }

    fn restart_time_wait(&mut self) {
        self.arm_timer(TimerKind::TimeWait, self.config.time_wait);
    }

    fn transition(&mut self, to: State) {
        let from = self.state;
        if from == to {
            return;
        }
        logging::state_event(self.id, from, to);
        self.state = to;
        self.actions.push(Action::StateChange { from, to });
        match to {
            State::TimeWait => {
                if let Some(kind) = self.timers.pending_kind() {
                    self.cancel_timer(kind);
                }
                self.cancel_timer(TimerKind::DelayedAck);
                self.outgoing.reset();
                self.restart_time_wait();
            }
            State::Closed => {
                self.timers.clear();
                self.outgoing.reset();
                self.incoming.clear();
            }
            _ => {}
        }
    }

    fn arm_timer(&mut self, kind: TimerKind, after: Ticks) {
        // Retransmit, Probe0 and Keepalive replace one another
        if let Some(replaced) = self.timers.pending_kind() {
            if replaced != kind && kind.is_transmission() {
                self.actions
                    .push(Action::Timer(TimerRequest::Cancel(replaced)));
            }
        }
        self.timers.arm(kind, self.now + after);
        self.actions
            .push(Action::Timer(TimerRequest::Arm { kind, after }));
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        if self.timers.cancel(kind) {
            self.actions.push(Action::Timer(TimerRequest::Cancel(kind)));
        }
    }

    /// Opens the fast path when the next segment is predictable: an
    /// established connection with no hole in the receive sequence and no
    /// urgent data outstanding.
    fn update_prediction(&mut self) {
        let urgent_ahead = self.urgent.map_or(false, |mark| after(mark, self.rcv.nxt));
        self.pred_flags = (self.state == State::Established
            && self.incoming.is_empty()
            && !urgent_ahead)
            .then(|| {
                segment::prediction_word(
                    segment::BASE_HEADER_WORDS,
                    Control::ACK,
                    self.snd.wnd.min(u16::MAX as u32) as u16,
                )
            });
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn snd(&self) -> &SendSequenceSpace {
        &self.snd
    }

    pub fn rcv(&self) -> &ReceiveSequenceSpace {
        &self.rcv
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn congestion(&self) -> &CongestionWindow {
        &self.window
    }

    pub fn algorithm(&self) -> CongestionAlgorithm {
        self.strategy.algorithm()
    }

    pub fn fast_retransmit(&self) -> &FastRetransmit {
        &self.fast
    }

    pub fn retransmits(&self) -> u32 {
        self.retransmits
    }

    pub fn packets_out(&self) -> usize {
        self.outgoing.packets_out()
    }

    pub fn outgoing(&self) -> &Outgoing {
        &self.outgoing
    }

    pub fn incoming(&self) -> &Incoming {
        &self.incoming
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// The earliest tick at which [`Tcb::advance_time`] has work to do
    pub fn next_deadline(&self) -> Option<Ticks> {
        self.timers.next_deadline()
    }

    pub fn pred_flags(&self) -> Option<u32> {
        self.pred_flags
    }

    pub fn urgent_mark(&self) -> Option<u32> {
        self.urgent
    }

    /// Octets of in-order data waiting for [`Tcb::receive`]
    pub fn readable(&self) -> usize {
        self.received.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentArrivesResult {
    Ok,
    /// The connection reached CLOSED and its control block can be dropped
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceTimeResult {
    /// Nothing the owner needs to act on
    Idle,
    /// A retransmission or probe was sent
    Retry { attempt: u32 },
    /// The connection reached CLOSED and its control block can be dropped
    Close,
}

/// A terminal connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection refused")]
    Refused,
    #[error("Broken pipe")]
    BrokenPipe,
    #[error("Connection reset")]
    Reset,
    #[error("Connection timed out")]
    TimedOut,
}

impl ConnectionError {
    /// The error reported for a reset received in the given state.
    pub fn from_reset(state: State) -> Self {
        match state {
            State::SynSent => Self::Refused,
            State::CloseWait => Self::BrokenPipe,
            _ => Self::Reset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Cannot send in state {0}")]
    InvalidState(State),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    #[error("Cannot close in state {0}")]
    InvalidState(State),
}
