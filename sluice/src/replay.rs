//! Replays a parsed trace through a [`Tcp`] registry and prints what the
//! engine does.

use crate::trace::{ConfigOption, Directive, Line, ParseError};
use sluice_core::{
    tcp::{
        Action, ConnectionError, DemuxError, Event, OpenError, SegmentArrivesResult, State, Step,
        TcpSession, Ticks,
    },
    ConnectionId, Endpoint, Message, Shutdown, Tcp, TcpConfig,
};
use std::{fmt, io::Write, net::Ipv4Addr, sync::Arc};
use tokio::sync::mpsc;

/// The connection a trace drives
pub const CONNECTION: ConnectionId = ConnectionId::new(
    Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 49152),
    Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 80),
);

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Line {0}: no connection has been established")]
    NotEstablished(usize),
    #[error("Line {0}: configuration must come before the connection is established")]
    LateConfig(usize),
    #[error("Line {line}: tick {at} is before the current tick {now}")]
    ClockWentBackwards { line: usize, at: Ticks, now: Ticks },
    #[error("Line {line}: {source}")]
    Open { line: usize, source: OpenError },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where a replay ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub now: Ticks,
    /// The state of the connection, `None` once it was removed
    pub state: Option<State>,
    /// Octets handed to the application by `read`
    pub read: usize,
    /// Actions the engine produced
    pub actions: usize,
    /// Why the connection failed, if it did
    pub error: Option<ConnectionError>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Finished at tick {}: ", self.now)?;
        match (self.state, self.error) {
            (_, Some(error)) => write!(f, "failed ({error})")?,
            (Some(state), None) => write!(f, "{state}")?,
            (None, None) => write!(f, "closed")?,
        }
        write!(f, ", {} octets read, {} actions", self.read, self.actions)
    }
}

/// Replays trace directives one at a time, writing a line for every action.
#[derive(Debug)]
pub struct Replayer<W> {
    config: TcpConfig,
    tcp: Option<Arc<Tcp>>,
    out: W,
    now: Ticks,
    read: usize,
    actions: usize,
    error: Option<ConnectionError>,
}

impl<W: Write> Replayer<W> {
    pub fn new(config: TcpConfig, out: W) -> Self {
        Self {
            config,
            tcp: None,
            out,
            now: 0,
            read: 0,
            actions: 0,
            error: None,
        }
    }

    /// Replays every line in order.
    pub fn run(&mut self, lines: &[Line]) -> Result<Summary, ReplayError> {
        for line in lines {
            self.line(line)?;
        }
        Ok(self.summary())
    }

    pub fn summary(&self) -> Summary {
        Summary {
            now: self.now,
            state: self.session().map(|session| session.state()),
            read: self.read,
            actions: self.actions,
            error: self.error,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, line: &Line) -> Result<(), ReplayError> {
        if let Some(at) = line.at {
            if at < self.now {
                return Err(ReplayError::ClockWentBackwards {
                    line: line.number,
                    at,
                    now: self.now,
                });
            }
            self.now = at;
        }
        // Timers due by now fire before the directive happens
        if let Some(tcp) = self.tcp.clone() {
            for event in tcp.advance(self.now) {
                self.event(event)?;
            }
        }

        match &line.directive {
            Directive::Config(options) => {
                if self.tcp.is_some() {
                    return Err(ReplayError::LateConfig(line.number));
                }
                for option in options {
                    self.configure(*option);
                }
            }
            Directive::Establish(handshake) => {
                let tcp = self
                    .tcp
                    .get_or_insert_with(|| Tcp::new(self.config.clone()).shared())
                    .clone();
                tcp.set_now(self.now);
                tcp.establish(CONNECTION, *handshake)
                    .map_err(|source| ReplayError::Open {
                        line: line.number,
                        source,
                    })?;
                writeln!(self.out, "[{}] established {CONNECTION}", self.now)?;
            }
            Directive::Send(len) => {
                let Some(session) = self.require(line.number)? else {
                    return Ok(());
                };
                let text = Message::new(vec![b'x'; *len]);
                let Step { result, actions } = session.send(text, self.now);
                self.actions(actions)?;
                if let Err(e) = result {
                    writeln!(self.out, "[{}] send refused: {e}", self.now)?;
                }
            }
            Directive::Close => {
                let Some(session) = self.require(line.number)? else {
                    return Ok(());
                };
                let Step { result, actions } = session.close(self.now);
                self.actions(actions)?;
                if let Err(e) = result {
                    writeln!(self.out, "[{}] close refused: {e}", self.now)?;
                }
            }
            Directive::Read => {
                let Some(session) = self.require(line.number)? else {
                    return Ok(());
                };
                let Step { result, actions } = session.receive();
                self.read += result.len();
                writeln!(
                    self.out,
                    "[{}] read {} octets: {:?}",
                    self.now,
                    result.len(),
                    String::from_utf8_lossy(&result.to_vec())
                )?;
                self.actions(actions)?;
            }
            Directive::Tick => {}
            Directive::Recv(segment) => {
                let Some(tcp) = self.tcp.clone() else {
                    return Err(ReplayError::NotEstablished(line.number));
                };
                writeln!(self.out, "[{}] recv {segment}", self.now)?;
                match tcp.demux(CONNECTION, segment.clone()) {
                    Ok(Step { result, actions }) => {
                        self.actions(actions)?;
                        if result == SegmentArrivesResult::Close {
                            writeln!(self.out, "[{}] closed", self.now)?;
                        }
                    }
                    Err(DemuxError::Connection { error, actions, .. }) => {
                        self.actions(actions)?;
                        self.fail(error)?;
                    }
                    Err(DemuxError::MissingSession(_)) => {
                        writeln!(self.out, "[{}] no connection, dropped", self.now)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Keeps running timers in real time, one tick every `config.tick`, until
    /// the connection is gone or `shutdown` fires.
    pub async fn drain(&mut self, shutdown: Shutdown) -> Result<Summary, ReplayError> {
        let Some(tcp) = self.tcp.clone() else {
            return Ok(self.summary());
        };
        if tcp.is_empty() {
            return Ok(self.summary());
        }
        let (sink, mut events) = mpsc::channel(64);
        let handle = tcp.clone().start(sink, shutdown.clone());
        while let Some(event) = events.recv().await {
            self.now = tcp.now();
            let removed = matches!(event, Event::Closed(_) | Event::Failed(..));
            self.event(event)?;
            if removed && tcp.is_empty() {
                break;
            }
        }
        shutdown.shut_down();
        if let Err(e) = handle.await {
            tracing::error!("Timer loop failed: {e}");
        }
        self.now = self.now.max(tcp.now());
        Ok(self.summary())
    }

    fn configure(&mut self, option: ConfigOption) {
        let config = std::mem::take(&mut self.config);
        self.config = match option {
            ConfigOption::Mss(mss) => config.mss(mss),
            ConfigOption::Cwnd(cwnd) => config.initial_cwnd(cwnd),
            ConfigOption::Ssthresh(ssthresh) => config.initial_ssthresh(ssthresh),
            ConfigOption::Algorithm(algorithm) => config.congestion(algorithm),
            ConfigOption::ReceiveBuffer(octets) => config.receive_buffer(octets),
            ConfigOption::Retries(retries) => config.max_retries(retries),
            ConfigOption::Probes(probes) => config.max_probes(probes),
            ConfigOption::Keepalive(idle) => config.keepalive(Some(idle)),
            ConfigOption::TimeWait(ticks) => config.time_wait(ticks),
        };
    }

    fn session(&self) -> Option<Arc<TcpSession>> {
        self.tcp.as_ref()?.session(CONNECTION)
    }

    /// The session a user call goes to. A connection that already closed is
    /// reported and skipped.
    fn require(&mut self, line: usize) -> Result<Option<Arc<TcpSession>>, ReplayError> {
        if self.tcp.is_none() {
            return Err(ReplayError::NotEstablished(line));
        }
        let session = self.session();
        if session.is_none() {
            writeln!(self.out, "[{}] no connection", self.now)?;
        }
        Ok(session)
    }

    fn actions(&mut self, actions: Vec<Action>) -> Result<(), ReplayError> {
        for action in actions {
            self.actions += 1;
            writeln!(self.out, "[{}] {action}", self.now)?;
        }
        Ok(())
    }

    fn event(&mut self, event: Event) -> Result<(), ReplayError> {
        match event {
            Event::Action(_, action) => self.actions(vec![action]),
            Event::Closed(_) => {
                writeln!(self.out, "[{}] closed", self.now)?;
                Ok(())
            }
            Event::Failed(_, error) => self.fail(error),
        }
    }

    fn fail(&mut self, error: ConnectionError) -> Result<(), ReplayError> {
        tracing::info!("Connection {CONNECTION} failed: {error}");
        self.error = Some(error);
        writeln!(self.out, "[{}] failed: {error}", self.now)?;
        Ok(())
    }
}
