//! Market data session: subscription semantics and quote delivery

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::tempdir;

use front_client::mocks::MockFront;
use front_client::models::{Credentials, QuoteTick};
use front_client::session::{SessionConfig, SessionState};
use front_client::wire::{RequestBody, ResponseBody, ResumeMode};

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
    Credentials { broker_id: "9999".into(), user_id: "md01".into(), password: "good".into() }
}

fn quote(instrument: &str, last_price: u64) -> QuoteTick {
    QuoteTick {
        instrument_id: instrument.into(),
        last_price,
        bid_price: last_price - 2,
        bid_volume: 10,
        ask_price: last_price + 2,
        ask_volume: 12,
        volume: 1000,
        ts: 1_754_500_000_000,
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

fn ready_client(
    front: &MockFront,
    dir: &std::path::Path,
) -> front_client::client::MarketDataClient {
    let client =
        front_client::client::MarketDataClient::create_with(dir, &front.endpoint(), test_config())
            .unwrap();
    client.connect().unwrap();
    client.login(credentials()).unwrap().wait().unwrap();
    client
}

#[test]
fn test_subscribe_reaches_ready() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = ready_client(&front, dir.path());

    // Market data sessions hold at Authenticated until a subscription lands
    assert!(wait_for(|| client.state() == SessionState::Authenticated, Duration::from_secs(2)));

    let outcome = client.subscribe_quote(&["IF2509", "IC2509"]).unwrap().wait();
    assert!(matches!(outcome, Ok(ResponseBody::Subscribed(_))));
    assert!(wait_for(|| client.state() == SessionState::Ready, Duration::from_secs(2)));

    let subs = client.snapshot().unwrap().dispatcher.subscriptions;
    assert_eq!(subs, vec!["IF2509".to_string(), "IC2509".to_string()]);
}

#[test]
fn test_subscribe_twice_is_one_subscription() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = ready_client(&front, dir.path());

    client.subscribe_quote(&["IF2509"]).unwrap().wait().unwrap();

    // Duplicate subscribe resolves locally, no second gateway round trip
    let outcome = client.subscribe_quote(&["IF2509"]).unwrap().wait();
    assert_eq!(outcome, Ok(ResponseBody::Subscribed(Vec::new())));

    let wire_subscribes = front
        .requests()
        .iter()
        .filter(|r| matches!(r, RequestBody::Subscribe(_)))
        .count();
    assert_eq!(wire_subscribes, 1);

    let subs = client.snapshot().unwrap().dispatcher.subscriptions;
    assert_eq!(subs, vec!["IF2509".to_string()]);
}

#[test]
fn test_unsubscribe_unknown_is_noop() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = ready_client(&front, dir.path());

    let outcome = client.unsubscribe_quote(&["ZZ9999"]).unwrap().wait();
    assert_eq!(outcome, Ok(ResponseBody::Unsubscribed(Vec::new())));

    let wire_unsubscribes = front
        .requests()
        .iter()
        .filter(|r| matches!(r, RequestBody::Unsubscribe(_)))
        .count();
    assert_eq!(wire_unsubscribes, 0);
}

#[test]
fn test_partial_overlap_subscribes_only_fresh() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = ready_client(&front, dir.path());

    client.subscribe_quote(&["IF2509"]).unwrap().wait().unwrap();
    client.subscribe_quote(&["IF2509", "IC2509"]).unwrap().wait().unwrap();

    let sent: Vec<Vec<String>> = front
        .requests()
        .iter()
        .filter_map(|r| match r {
            RequestBody::Subscribe(ids) => Some(ids.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![vec!["IF2509".to_string()], vec!["IC2509".to_string()]]);
}

#[test]
fn test_quotes_delivered_in_arrival_order() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = ready_client(&front, dir.path());

    let prices: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = prices.clone();
    client.on_quote(move |q| seen.lock().unwrap().push(q.last_price)).unwrap();

    client.subscribe_quote(&["IF2509"]).unwrap().wait().unwrap();

    for price in [100, 101, 102, 103] {
        front.push_quote(quote("IF2509", price));
    }

    assert!(wait_for(|| prices.lock().unwrap().len() == 4, Duration::from_secs(2)));
    assert_eq!(*prices.lock().unwrap(), vec![100, 101, 102, 103]);
}

#[test]
fn test_handlers_fire_in_registration_order() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = ready_client(&front, dir.path());

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let order = order.clone();
        client.on_quote(move |_| order.lock().unwrap().push(tag)).unwrap();
    }

    client.subscribe_quote(&["IF2509"]).unwrap().wait().unwrap();
    front.push_quote(quote("IF2509", 200));

    assert!(wait_for(|| order.lock().unwrap().len() == 2, Duration::from_secs(2)));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn test_reconnect_requires_explicit_resubscription() {
    let front = MockFront::spawn().unwrap();
    let dir = tempdir().unwrap();
    let client = ready_client(&front, dir.path());

    client.subscribe_quote(&["IF2509"]).unwrap().wait().unwrap();
    assert_eq!(client.snapshot().unwrap().dispatcher.subscriptions.len(), 1);

    front.drop_connections();

    // Auto-reconnect relogs in, but subscriptions are not replayed
    assert!(wait_for(|| front.login_seqs().len() == 2, Duration::from_secs(5)));
    assert!(wait_for(
        || client.snapshot().map(|s| s.dispatcher.subscriptions.is_empty()).unwrap_or(false),
        Duration::from_secs(2)
    ));

    // An explicit resubscribe actually reaches the gateway again
    client.subscribe_quote(&["IF2509"]).unwrap().wait().unwrap();
    let wire_subscribes = front
        .requests()
        .iter()
        .filter(|r| matches!(r, RequestBody::Subscribe(_)))
        .count();
    assert_eq!(wire_subscribes, 2);
}
