//! The receive side of the [Transmission Control
//! Protocol](https://www.rfc-editor.org/rfc/rfc9293.html) for established
//! connections.
//!
//! [`Tcb`] holds the protocol state of one connection. [`Tcp`] is a registry
//! of connections keyed by their endpoints, which routes incoming segments,
//! serializes access to each control block and drives their timers.

use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    fmt,
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{sync::mpsc::Sender, task::JoinHandle};

mod config;
mod session;
pub mod tcb;

pub use config::{TcpConfig, DEFAULT_MSS, DEFAULT_RECEIVE_BUFFER, MSL};
pub use session::{Step, TcpSession};
pub use tcb::{
    congestion::CongestionAlgorithm, Action, AdvanceTimeResult, CloseError, ConnectionError,
    Handshake, Segment, SegmentArrivesResult, SendError, State, Tcb, Ticks, TimerKind,
    TimerRequest, HZ,
};

use crate::shutdown::Shutdown;

/// A registry of established TCP connections.
#[derive(Debug, Default)]
pub struct Tcp {
    /// A lookup table for sessions based on their endpoints.
    sessions: DashMap<ConnectionId, Arc<TcpSession>>,
    /// The configuration given to new connections
    config: TcpConfig,
    /// The current tick
    clock: AtomicU64,
}

impl Tcp {
    /// Creates a new registry
    pub fn new(config: TcpConfig) -> Self {
        Self {
            sessions: Default::default(),
            config,
            clock: AtomicU64::new(0),
        }
    }

    /// Converts the registry into a shared one.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// The current tick
    pub fn now(&self) -> Ticks {
        self.clock.load(Ordering::Acquire)
    }

    /// Moves the clock forward to `now`. The clock never runs backwards.
    pub fn set_now(&self, now: Ticks) -> Ticks {
        self.clock.fetch_max(now, Ordering::AcqRel).max(now)
    }

    /// Registers a connection whose handshake just completed.
    pub fn establish(
        &self,
        id: ConnectionId,
        handshake: Handshake,
    ) -> Result<Arc<TcpSession>, OpenError> {
        self.establish_with(id, handshake, self.config.clone())
    }

    /// Registers a connection with its own configuration.
    pub fn establish_with(
        &self,
        id: ConnectionId,
        handshake: Handshake,
        config: TcpConfig,
    ) -> Result<Arc<TcpSession>, OpenError> {
        match self.sessions.entry(id) {
            Entry::Occupied(_) => {
                tracing::error!("Tried to establish an existing connection {id}");
                Err(OpenError::Existing(id))
            }
            Entry::Vacant(entry) => {
                let tcb = Tcb::established(id, handshake, config, self.now());
                let session = TcpSession::new(tcb);
                entry.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Routes an incoming segment to its connection. `id` names the connection
    /// from the local point of view. Connections that closed are removed.
    pub fn demux(
        &self,
        id: ConnectionId,
        segment: Segment,
    ) -> Result<Step<SegmentArrivesResult>, DemuxError> {
        let session = self
            .session(id)
            .ok_or(DemuxError::MissingSession(id))?;
        let Step { result, actions } = session.segment_arrives(segment, self.now());
        match result {
            Ok(SegmentArrivesResult::Ok) => Ok(Step {
                result: SegmentArrivesResult::Ok,
                actions,
            }),
            Ok(SegmentArrivesResult::Close) => {
                self.remove(id);
                Ok(Step {
                    result: SegmentArrivesResult::Close,
                    actions,
                })
            }
            Err(error) => {
                self.remove(id);
                Err(DemuxError::Connection { id, error, actions })
            }
        }
    }

    pub fn session(&self, id: ConnectionId) -> Option<Arc<TcpSession>> {
        self.sessions.get(&id).map(|session| session.clone())
    }

    /// The connections currently registered
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops a connection from the registry.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<TcpSession>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() {
            tracing::debug!("Removed connection {id}");
        }
        removed
    }

    /// Runs every connection's expired timers at tick `now`. Connections that
    /// closed or failed are removed.
    pub fn advance(&self, now: Ticks) -> Vec<Event> {
        let now = self.set_now(now);
        // Collect first so no shard lock is held while a session runs
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut events = vec![];
        for session in sessions {
            let id = session.id();
            let Step { result, actions } = session.advance_time(now);
            events.extend(actions.into_iter().map(|action| Event::Action(id, action)));
            match result {
                Ok(AdvanceTimeResult::Idle | AdvanceTimeResult::Retry { .. }) => {}
                Ok(AdvanceTimeResult::Close) => {
                    self.remove(id);
                    events.push(Event::Closed(id));
                }
                Err(error) => {
                    self.remove(id);
                    events.push(Event::Failed(id, error));
                }
            }
        }
        events
    }

    /// Starts driving the timers of every connection, one tick every
    /// `config.tick`, and forwards what happens to `sink`. Runs until
    /// `shutdown` fires or `sink` is closed.
    pub fn start(self: Arc<Self>, sink: Sender<Event>, shutdown: Shutdown) -> JoinHandle<()> {
        let mut signal = shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            'outer: loop {
                tokio::select! {
                    _ = signal.wait() => break,
                    _ = interval.tick() => {
                        let now = self.now() + 1;
                        for event in self.advance(now) {
                            if sink.send(event).await.is_err() {
                                tracing::warn!("Event sink closed, stopping the timer loop");
                                break 'outer;
                            }
                        }
                    }
                }
            }
            tracing::debug!("TCP timer loop stopped at tick {}", self.now());
        })
    }
}

/// Something that happened to a connection while its timers were driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection produced an action
    Action(ConnectionId, Action),
    /// The connection closed and was removed
    Closed(ConnectionId),
    /// The connection failed and was removed
    Failed(ConnectionId, ConnectionError),
}

/// An IPv4 address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, 0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// A pair of endpoints that uniquely identifies a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionId {
    /// The local endpoint
    pub local: Endpoint,
    /// The remote endpoint
    pub remote: Endpoint,
}

impl ConnectionId {
    pub const fn new(local: Endpoint, remote: Endpoint) -> Self {
        Self { local, remote }
    }

    /// Swaps the local and remote endpoints
    pub const fn reverse(self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.local, self.remote)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("The connection {0} already exists")]
    Existing(ConnectionId),
}

#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    #[error("No session for {0}")]
    MissingSession(ConnectionId),
    #[error("Connection {id} failed: {error}")]
    Connection {
        id: ConnectionId,
        error: ConnectionError,
        /// Actions produced before the failure, including the state change
        actions: Vec<Action>,
    },
}
