//! Failure tests for the simulation engine
//!
//! These tests verify that failures stay contained:
//! - Unreachable or silent servers
//! - Rejected submissions
//! - Malformed responses
//! - One failing host among healthy ones

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use zabbix_sim::{
    actors::{messages::HostOutcome, scheduler::SchedulerHandle},
    agent::{ActiveAgent, Session},
    recording::parse_recording,
    transport::SessionClient,
};

use crate::helpers::*;

#[tokio::test]
async fn test_unreachable_server_keeps_session_and_countdowns_running() {
    let transport = Arc::new(DownTransport::default());
    let agent = ActiveAgent::new("127.0.0.1:9", transport.clone(), Session::new(50));
    let hosts = parse_recording(PING_RECORDING).unwrap();
    let handle = SchedulerHandle::spawn_manual(agent, hosts, 5);

    handle.send_now().await.unwrap();
    let report = handle.send_now().await.unwrap();

    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(e)) if e.is_transport());
    assert_eq!(report.failures(), 1);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.session("web01"), Some(Session::new(50)));
    // the countdown was reset even though the send failed; no retry is scheduled
    assert_eq!(
        snapshot.host("web01").unwrap().item("agent.ping").unwrap().remaining_seconds,
        10
    );

    // the engine keeps going after an unbounded run of failures
    for _ in 0..10 {
        handle.send_now().await.unwrap();
    }
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 6);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_over_tcp() {
    // bind and drop to find a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let agent = ActiveAgent::new(
        address,
        Arc::new(SessionClient::new(Duration::from_secs(2))),
        Session::new(1),
    );
    let handle = SchedulerHandle::spawn_manual(agent, parse_recording(PING_RECORDING).unwrap(), 10);

    let report = handle.send_now().await.unwrap();
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(e)) if e.is_transport());

    let report = handle.refresh_now().await.unwrap();
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(e)) if e.is_transport());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_submission_then_recovery() {
    let server = MockZabbixServer::start(serde_json::json!([])).await;
    server.set_behavior(Behavior::RejectHost("web01".to_string()));

    let agent = ActiveAgent::new(
        server.address(),
        Arc::new(SessionClient::new(Duration::from_secs(2))),
        Session::new(7),
    );
    let handle = SchedulerHandle::spawn_manual(agent, parse_recording(PING_RECORDING).unwrap(), 10);

    let report = handle.send_now().await.unwrap();
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(e)) if e.is_protocol());
    assert_eq!(handle.snapshot().await.unwrap().session("web01"), Some(Session::new(7)));

    server.set_behavior(Behavior::Accept);
    let report = handle.send_now().await.unwrap();
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Sent { .. }));

    // the failed batch and the accepted one carried the same session
    let sessions: Vec<_> = server
        .agent_data()
        .into_iter()
        .map(|submission| submission.session)
        .collect();
    assert_eq!(sessions, vec!["00000000000000000007", "00000000000000000007"]);
    assert_eq!(handle.snapshot().await.unwrap().session("web01"), Some(Session::new(8)));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_host_does_not_block_others() {
    let server = MockZabbixServer::start(serde_json::json!([
        {"key": "mysql.ping", "delay": 30}
    ]))
    .await;
    server.set_behavior(Behavior::RejectHost("web01".to_string()));

    let agent = ActiveAgent::new(
        server.address(),
        Arc::new(SessionClient::new(Duration::from_secs(2))),
        Session::new(1),
    );
    let hosts = parse_recording(MULTI_HOST_RECORDING).unwrap();
    let handle = SchedulerHandle::spawn_manual(agent, hosts, 5);

    let report = handle.send_now().await.unwrap();
    assert_matches!(report.outcome("db01"), Some(HostOutcome::Sent { items: 1, .. }));
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(_)));

    let report = handle.refresh_now().await.unwrap();
    assert_matches!(report.outcome("db01"), Some(HostOutcome::Refreshed { updated: 1, .. }));
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(_)));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.host("db01").unwrap().item("mysql.ping").unwrap().interval_seconds,
        30
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_garbage_response_is_protocol_error() {
    let server = MockZabbixServer::start(serde_json::json!([])).await;
    server.set_behavior(Behavior::Garbage);

    let agent = ActiveAgent::new(
        server.address(),
        Arc::new(SessionClient::new(Duration::from_secs(2))),
        Session::new(3),
    );
    let handle = SchedulerHandle::spawn_manual(agent, parse_recording(PING_RECORDING).unwrap(), 10);

    let report = handle.send_now().await.unwrap();
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(e)) if e.is_protocol());
    assert_eq!(handle.snapshot().await.unwrap().session("web01"), Some(Session::new(3)));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_silent_server_times_out_and_engine_recovers() {
    let server = MockZabbixServer::start(serde_json::json!([])).await;
    server.set_behavior(Behavior::Silent);

    let agent = ActiveAgent::new(
        server.address(),
        Arc::new(SessionClient::new(Duration::from_millis(300))),
        Session::new(3),
    );
    let handle = SchedulerHandle::spawn_manual(agent, parse_recording(PING_RECORDING).unwrap(), 10);

    let started = std::time::Instant::now();
    let report = handle.send_now().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Failed(e)) if e.is_transport());

    server.set_behavior(Behavior::Accept);
    let report = handle.send_now().await.unwrap();
    assert_matches!(report.outcome("web01"), Some(HostOutcome::Sent { .. }));
    assert_eq!(handle.snapshot().await.unwrap().session("web01"), Some(Session::new(4)));

    handle.shutdown().await.unwrap();
}
