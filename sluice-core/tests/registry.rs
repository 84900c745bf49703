use sluice_core::{
    tcp::{
        tcb::SegmentBuilder,
        Action, ConnectionError, DemuxError, Event, Handshake, OpenError, SegmentArrivesResult,
        State, MSL,
    },
    ConnectionId, Endpoint, Message, Segment, Shutdown, Tcp, TcpConfig,
};
use std::{net::Ipv4Addr, time::Duration};
use tokio::sync::mpsc;

const ISS: u32 = 7_000;
const IRS: u32 = 90_000;

const ID: ConnectionId = ConnectionId::new(
    Endpoint::new(Ipv4Addr::new(192, 168, 1, 10), 0xbeef),
    Endpoint::new(Ipv4Addr::new(192, 168, 1, 20), 80),
);

const HANDSHAKE: Handshake = Handshake {
    iss: ISS,
    irs: IRS,
    peer_window: 8_000,
};

fn peer(seq: u32, ack: u32) -> SegmentBuilder {
    Segment::builder(seq).ack(ack).wnd(8_000)
}

/// Brings the connection to TIME_WAIT through an active close.
fn enter_time_wait(tcp: &Tcp) {
    let session = tcp.session(ID).unwrap();
    session.close(tcp.now()).result.unwrap();
    tcp.demux(ID, peer(IRS + 1, ISS + 2).build()).unwrap();
    assert_eq!(session.state(), State::FinWait2);
    tcp.demux(ID, peer(IRS + 1, ISS + 2).fin().build()).unwrap();
    assert_eq!(session.state(), State::TimeWait);
}

#[test]
fn establishing_twice_fails() {
    let tcp = Tcp::default();
    tcp.establish(ID, HANDSHAKE).unwrap();
    assert!(matches!(
        tcp.establish(ID, HANDSHAKE),
        Err(OpenError::Existing(id)) if id == ID
    ));
    assert_eq!(tcp.len(), 1);
    assert_eq!(tcp.ids(), vec![ID]);
}

#[test]
fn demux_routes_segments_to_their_session() {
    let tcp = Tcp::new(TcpConfig::default().mss(100));
    let session = tcp.establish(ID, HANDSHAKE).unwrap();

    let data = peer(IRS + 1, ISS + 1).text(b"hello".as_slice()).build();
    let step = tcp.demux(ID, data).unwrap();
    assert_eq!(step.result, SegmentArrivesResult::Ok);
    assert!(step.actions.contains(&Action::Readable { bytes: 5 }));
    assert_eq!(session.receive().result, Message::new(b"hello"));

    assert!(matches!(
        tcp.demux(ID.reverse(), peer(IRS + 6, ISS + 1).build()),
        Err(DemuxError::MissingSession(_))
    ));
}

#[test]
fn reset_removes_the_session() {
    let tcp = Tcp::default();
    tcp.establish(ID, HANDSHAKE).unwrap();
    let rst = Segment::builder(IRS + 1).rst().build();
    match tcp.demux(ID, rst) {
        Err(DemuxError::Connection { id, error, actions }) => {
            assert_eq!(id, ID);
            assert_eq!(error, ConnectionError::Reset);
            assert!(actions.contains(&Action::StateChange {
                from: State::Established,
                to: State::Closed,
            }));
        }
        other => panic!("Expected a reset, got {other:?}"),
    }
    assert!(tcp.is_empty());
    assert!(matches!(
        tcp.demux(ID, peer(IRS + 1, ISS + 1).build()),
        Err(DemuxError::MissingSession(id)) if id == ID
    ));
}

#[test]
fn advance_runs_every_timer() {
    let tcp = Tcp::new(TcpConfig::default().mss(100).max_retries(1));
    let session = tcp.establish(ID, HANDSHAKE).unwrap();
    session.send(Message::new(vec![1u8; 100]), tcp.now()).result.unwrap();

    let events = tcp.advance(300);
    assert_eq!(tcp.now(), 300);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::Action(id, Action::Retransmit(_)) if *id == ID)));

    let deadline = session.next_deadline().unwrap();
    let events = tcp.advance(deadline);
    assert!(events.contains(&Event::Failed(ID, ConnectionError::TimedOut)));
    assert!(tcp.is_empty());
}

#[test]
fn clock_never_runs_backwards() {
    let tcp = Tcp::default();
    tcp.advance(50);
    tcp.advance(20);
    assert_eq!(tcp.now(), 50);
}

#[test]
fn time_wait_expires_through_the_registry() {
    let tcp = Tcp::default();
    tcp.establish(ID, HANDSHAKE).unwrap();
    enter_time_wait(&tcp);
    assert!(tcp.advance(2 * MSL - 1).is_empty());
    let events = tcp.advance(2 * MSL);
    assert!(events.contains(&Event::Closed(ID)));
    assert!(tcp.is_empty());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn timer_loop_closes_sessions_until_shutdown() {
    let config = TcpConfig::default()
        .time_wait(5)
        .tick(Duration::from_millis(1));
    let tcp = Tcp::new(config).shared();
    tcp.establish(ID, HANDSHAKE).unwrap();
    enter_time_wait(&tcp);

    let (sink, mut events) = mpsc::channel(16);
    let shutdown = Shutdown::new();
    let handle = tcp.clone().start(sink, shutdown.clone());

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if event == Event::Closed(ID) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(closed);
    assert!(tcp.is_empty());

    shutdown.shut_down();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn timer_loop_stops_when_the_sink_closes() {
    let tcp = Tcp::new(TcpConfig::default().tick(Duration::from_millis(1))).shared();
    tcp.establish(ID, HANDSHAKE).unwrap();
    enter_time_wait(&tcp);

    let (sink, events) = mpsc::channel(1);
    drop(events);
    let shutdown = Shutdown::new();
    let handle = tcp.clone().start(sink, shutdown.clone());
    // The next tick expires TIME_WAIT and has an event to deliver
    tcp.advance(2 * MSL - 1);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
