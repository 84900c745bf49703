use sluice::{
    replay::{ReplayError, Replayer, Summary},
    trace::parse_trace,
};
use sluice_core::{
    tcp::{ConnectionError, State},
    Shutdown, TcpConfig,
};
use std::time::Duration;

/// Replays a trace and returns the summary along with everything printed.
fn replay(trace: &str) -> (Summary, String) {
    replay_with(TcpConfig::default(), trace)
}

fn replay_with(config: TcpConfig, trace: &str) -> (Summary, String) {
    let lines = parse_trace(trace).unwrap();
    let mut replayer = Replayer::new(config, Vec::new());
    let summary = replayer.run(&lines).unwrap();
    let out = String::from_utf8(replayer.into_inner()).unwrap();
    (summary, out)
}

fn replay_err(trace: &str) -> ReplayError {
    let lines = parse_trace(trace).unwrap();
    let mut replayer = Replayer::new(TcpConfig::default(), Vec::new());
    replayer.run(&lines).unwrap_err()
}

#[test]
#[ntest::timeout(1000)]
fn fast_retransmit_trace() {
    let (summary, out) = replay(include_str!("../traces/fast_retransmit.trace"));
    let retransmissions: Vec<_> = out
        .lines()
        .filter(|line| line.contains("] retransmit "))
        .collect();
    assert_eq!(retransmissions.len(), 1);
    assert!(retransmissions[0].starts_with("[8] retransmit seq=1101"));
    assert_eq!(summary.state, Some(State::Established));
    assert_eq!(summary.error, None);
    assert_eq!(summary.now, 20);
}

#[test]
#[ntest::timeout(1000)]
fn reassembly_trace() {
    let (summary, out) = replay(include_str!("../traces/reassembly.trace"));
    assert!(out.contains("[0] readable 5"));
    assert!(out.contains("[4] readable 11"));
    assert!(out.contains("[6] read 16 octets: \"firstsecondthird\""));
    assert_eq!(summary.read, 16);
    assert_eq!(summary.state, Some(State::Established));
}

#[test]
#[ntest::timeout(1000)]
fn simultaneous_close_trace() {
    let (summary, out) = replay(include_str!("../traces/simultaneous_close.trace"));
    for change in [
        "[0] state ESTABLISHED -> FIN-WAIT-1",
        "[5] state FIN-WAIT-1 -> CLOSING",
        "[10] state CLOSING -> TIME-WAIT",
        "[510] closed",
    ] {
        assert!(out.contains(change), "Missing '{change}' in:\n{out}");
    }
    assert_eq!(summary.state, None);
    assert_eq!(summary.error, None);
    assert!(summary.to_string().starts_with("Finished at tick 510: closed"));
}

#[test]
#[ntest::timeout(1000)]
fn timeout_trace() {
    let (summary, out) = replay(include_str!("../traces/timeout.trace"));
    assert!(out.contains("[300] retransmit seq=1001"));
    assert!(out.contains("[900] retransmit seq=1001"));
    assert!(out.contains("[2100] failed: Connection timed out"));
    assert_eq!(summary.state, None);
    assert_eq!(summary.error, Some(ConnectionError::TimedOut));
    assert!(summary
        .to_string()
        .starts_with("Finished at tick 2100: failed (Connection timed out)"));
}

#[test]
#[ntest::timeout(1000)]
fn zero_window_trace() {
    let (summary, out) = replay(include_str!("../traces/zero_window.trace"));
    assert!(out.contains("[300] window probe seq=1000"));
    assert!(out.contains("[900] window probe seq=1000"));
    assert!(out.contains("[950] transmit seq=1001"));
    assert_eq!(summary.state, Some(State::Established));
    assert_eq!(summary.error, None);
}

#[test]
#[ntest::timeout(1000)]
fn reset_is_reported() {
    let (summary, out) = replay(
        "establish iss=1 irs=100 window=1000\n\
         recv seq=101 flags=R @3\n\
         send 10 @4",
    );
    assert!(out.contains("[3] failed: Connection reset"));
    assert!(out.contains("[4] no connection"));
    assert_eq!(summary.error, Some(ConnectionError::Reset));
}

#[test]
#[ntest::timeout(1000)]
fn configuration_from_the_trace_wins() {
    let (_, out) = replay_with(
        TcpConfig::default().mss(100),
        "config mss=10\n\
         establish iss=1 irs=100 window=1000\n\
         send 25",
    );
    assert!(out.contains("transmit seq=2 ack=101 win=32768 len=10"));
}

#[test]
fn directives_need_a_connection() {
    assert!(matches!(replay_err("send 10"), ReplayError::NotEstablished(1)));
    assert!(matches!(
        replay_err("tick\nrecv seq=1"),
        ReplayError::NotEstablished(2)
    ));
}

#[test]
fn configuration_after_establish_is_rejected() {
    assert!(matches!(
        replay_err("establish iss=1 irs=100 window=1000\nconfig mss=10"),
        ReplayError::LateConfig(2)
    ));
}

#[test]
fn establishing_twice_is_rejected() {
    assert!(matches!(
        replay_err("establish iss=1 irs=100 window=1000\nestablish iss=1 irs=100 window=1000"),
        ReplayError::Open { line: 2, .. }
    ));
}

#[test]
fn clock_cannot_go_backwards() {
    assert!(matches!(
        replay_err("tick @10\ntick @9"),
        ReplayError::ClockWentBackwards {
            line: 2,
            at: 9,
            now: 10
        }
    ));
}

#[tokio::test]
async fn drain_runs_time_wait_to_completion() {
    let trace = "config timewait=5\n\
                 establish iss=1000 irs=5000 window=8192\n\
                 close @0\n\
                 recv seq=5001 ack=1002 win=8192 flags=AF @5";
    let lines = parse_trace(trace).unwrap();
    let config = TcpConfig::default().tick(Duration::from_millis(1));
    let mut replayer = Replayer::new(config, Vec::new());
    let summary = replayer.run(&lines).unwrap();
    assert_eq!(summary.state, Some(State::TimeWait));

    let summary = tokio::time::timeout(Duration::from_secs(5), replayer.drain(Shutdown::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.state, None);
    assert!(summary.now >= 10);
    let out = String::from_utf8(replayer.into_inner()).unwrap();
    assert!(out.lines().last().unwrap().ends_with("] closed"));
}
