//! Timer-driven cycles under paused Tokio time
//!
//! These use the in-memory transport: real sockets would let the paused clock
//! run ahead while the runtime waits on I/O.

use std::sync::Arc;
use std::time::Duration;

use zabbix_sim::{
    actors::scheduler::{SchedulerHandle, Timing},
    agent::{ActiveAgent, Session},
    recording::parse_recording,
};

use crate::helpers::*;

fn spawn(transport: Arc<MemoryTransport>) -> SchedulerHandle {
    let agent = ActiveAgent::new("127.0.0.1:10051", transport, Session::new(1));
    SchedulerHandle::spawn(
        agent,
        parse_recording(PING_RECORDING).unwrap(),
        Timing {
            send_interval: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(120),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_ten_second_item_reported_every_other_tick() {
    let transport = Arc::new(MemoryTransport::default());
    let handle = spawn(transport.clone());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(transport.count("agent data"), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.count("agent data"), 1);

    // ticks at 15 and 20, only the second one is due
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.count("agent data"), 2);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.session("web01"), Some(Session::new(3)));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_refresh_timer_fires_after_full_period() {
    let transport = Arc::new(MemoryTransport::default());
    let handle = spawn(transport.clone());

    tokio::time::sleep(Duration::from_secs(119)).await;
    assert_eq!(transport.count("active checks"), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.count("active checks"), 1);
    // due at 10, 20, ... 120
    assert_eq!(transport.count("agent data"), 12);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_both_timers() {
    let transport = Arc::new(MemoryTransport::default());
    let handle = spawn(transport.clone());

    tokio::time::sleep(Duration::from_secs(11)).await;
    handle.shutdown().await.unwrap();
    let seen = transport.requests().len();
    assert_eq!(seen, 1);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.requests().len(), seen);
    assert!(handle.snapshot().await.is_err());
}

fn spawn_stalling(transport: Arc<StallingTransport>) -> SchedulerHandle {
    let agent = ActiveAgent::new("127.0.0.1:10051", transport, Session::new(1));
    SchedulerHandle::spawn(
        agent,
        parse_recording(THREE_HOST_RECORDING).unwrap(),
        Timing {
            send_interval: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(3_600),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_ticks_missed_during_stall_are_not_replayed() {
    // every exchange hangs for 10s until the peer recovers at 60s
    let transport = Arc::new(StallingTransport::new(
        Duration::from_secs(10),
        Duration::from_secs(60),
        &[],
    ));
    let handle = spawn_stalling(transport.clone());

    tokio::time::sleep(Duration::from_secs(67)).await;

    let accepted = transport.accepted();
    let (first, _) = accepted.first().cloned().unwrap();
    assert!(first >= Duration::from_secs(60), "accepted at {first:?}");

    // at most one catch-up batch per host once the peer answers again
    let burst = accepted
        .iter()
        .filter(|(at, _)| *at < first + Duration::from_secs(1))
        .count();
    assert!(burst <= 3, "{burst} batches accepted at {first:?}");

    for host in ["a", "b", "c"] {
        assert!(transport.accepted_for(host) >= 1, "{host} never recovered");
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stalled_host_does_not_delay_others() {
    let transport = Arc::new(StallingTransport::new(
        Duration::from_secs(10),
        Duration::ZERO,
        &["a"],
    ));
    let handle = spawn_stalling(transport.clone());

    // 60 send ticks
    tokio::time::sleep(Duration::from_secs(302)).await;

    assert_eq!(transport.accepted_for("a"), 0);
    assert!(transport.accepted_for("b") >= 59, "b: {}", transport.accepted_for("b"));
    assert!(transport.accepted_for("c") >= 59, "c: {}", transport.accepted_for("c"));

    // the stalled host keeps its session, the others count theirs
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.session("a"), Some(Session::new(1)));
    assert!(snapshot.session("b").unwrap().value() >= 60);

    handle.shutdown().await.unwrap();
}
