//! Flow log durability: sequence continuity across restarts and
//! replay-reconstructed dispatcher state

use std::thread;
use std::time::{Duration, Instant};

use tempfile::tempdir;

use front_client::client::{MarketDataClient, TraderClient};
use front_client::mocks::MockFront;
use front_client::models::{Credentials, OrderInput, OrderType, Side};
use front_client::session::{SessionConfig, SessionState};
use front_client::wire::ResumeMode;

fn test_config() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_millis(1000),
        heartbeat_interval: Duration::from_millis(500),
        heartbeat_grace: Duration::from_millis(1000),
        request_timeout: Duration::from_millis(600),
        reconnect_initial_delay: Duration::from_millis(100),
        reconnect_max_delay: Duration::from_millis(400),
        reconnect_max_attempts: 3,
        resume: ResumeMode::Resume,
    }
}

fn credentials() -> Credentials {
    Credentials { broker_id: "9999".into(), user_id: "trader01".into(), password: "good".into() }
}

fn sample_order(order_ref: &str) -> OrderInput {
    OrderInput {
        instrument_id: "IF2509".into(),
        order_ref: order_ref.into(),
        side: Side::Sell,
        order_type: OrderType::Limit,
        price: 390_000,
        qty: 1,
    }
}

fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_sequence_numbers_strictly_increase() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = TraderClient::create_with(dir.path(), &front.endpoint(), test_config()).unwrap();

    client.connect().unwrap();
    client.login(credentials()).unwrap().wait().unwrap();
    client.place_order(sample_order("ref-a")).unwrap().wait().unwrap();
    client.place_order(sample_order("ref-b")).unwrap().wait().unwrap();

    // login + 2 orders, each one outbound and one inbound record
    let snap = client.snapshot().unwrap();
    assert_eq!(snap.last_seq, 6);
    assert!(!snap.storage_degraded);
}

#[test]
fn test_restart_resumes_sequence_and_ids() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();

    let (seq_before, next_id_before) = {
        let mut client =
            TraderClient::create_with(dir.path(), &front.endpoint(), test_config()).unwrap();
        client.connect().unwrap();
        client.login(credentials()).unwrap().wait().unwrap();
        client.place_order(sample_order("ref-1")).unwrap().wait().unwrap();

        let snap = client.snapshot().unwrap();
        client.close();
        (snap.last_seq, snap.dispatcher.next_request_id)
    };
    assert!(seq_before > 0);

    // Same flow directory: the new instance must continue, not restart
    let client = TraderClient::create_with(dir.path(), &front.endpoint(), test_config()).unwrap();
    let snap = client.snapshot().unwrap();
    assert_eq!(snap.last_seq, seq_before);
    assert_eq!(snap.dispatcher.next_request_id, next_id_before);

    client.connect().unwrap();
    client.login(credentials()).unwrap().wait().unwrap();

    // The relogin after restart carries the last durable sequence number
    let seqs = front.login_seqs();
    assert_eq!(seqs.len(), 2);
    assert_eq!(seqs[0], 0);
    assert_eq!(seqs[1], seq_before);

    // Fresh requests continue past the recovered id watermark
    let handle = client.place_order(sample_order("ref-2")).unwrap();
    assert!(handle.request_id() >= next_id_before);
    handle.wait().unwrap();
}

#[test]
fn test_replay_reconstructs_dispatcher_state() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();

    // Live run: login, subscribe, one duplicate-filtered subscribe
    let live_snapshot = {
        let mut client =
            MarketDataClient::create_with(dir.path(), &front.endpoint(), test_config()).unwrap();
        client.connect().unwrap();
        client.login(credentials()).unwrap().wait().unwrap();
        client.subscribe_quote(&["IF2509", "IC2509"]).unwrap().wait().unwrap();
        client.subscribe_quote(&["IF2509"]).unwrap().wait().unwrap();
        assert!(wait_for(|| client.state() == SessionState::Ready, Duration::from_secs(2)));

        let snap = client.snapshot().unwrap();
        client.close();
        snap
    };

    // Recovered run: open the same flow directory, never connect
    let client =
        MarketDataClient::create_with(dir.path(), &front.endpoint(), test_config()).unwrap();
    let recovered = client.snapshot().unwrap();

    // Dispatcher bookkeeping must match the uninterrupted run
    assert_eq!(recovered.dispatcher, live_snapshot.dispatcher);
    assert_eq!(recovered.last_seq, live_snapshot.last_seq);
}

#[test]
fn test_fresh_directory_starts_at_zero() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = TraderClient::create_with(
        dir.path().join("nested").join("flow"),
        &front.endpoint(),
        test_config(),
    )
    .unwrap();

    let snap = client.snapshot().unwrap();
    assert_eq!(snap.last_seq, 0);
    assert_eq!(snap.dispatcher.next_request_id, 1);
}

#[test]
fn test_second_instance_on_same_flow_dir_fails_fast() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();

    let _first = TraderClient::create_with(dir.path(), &front.endpoint(), test_config()).unwrap();
    let second = TraderClient::create_with(dir.path(), &front.endpoint(), test_config());

    assert!(matches!(second, Err(front_client::ClientError::Storage(_))));
}
