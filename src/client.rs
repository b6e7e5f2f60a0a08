//! Client facades
//!
//! `TraderClient` and `MarketDataClient` are the objects an application
//! holds: thin surfaces translating domain calls into dispatcher requests
//! on the owning session loop. Each instance owns its session outright —
//! its own loop thread, connection, dispatcher and flow directory — so
//! multiple clients coexist in one process with no shared mutable state.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::dispatcher::RequestOutcome;
use crate::endpoint::FrontAddr;
use crate::error::{ClientError, ClientResult};
use crate::events::{Event, EventKind};
use crate::models::{
    AccountSnapshot, AuthInfo, Credentials, OrderInput, OrderUpdate, Position, QuoteTick,
};
use crate::session::{
    Command, SessionConfig, SessionCore, SessionRole, SessionShared, SessionSnapshot, SessionState,
};
use crate::wire::{RequestBody, ResponseBody};

/// Version string reported by `api_version()`
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One outstanding correlated request
///
/// Resolves exactly once: success, `Timeout`, `GatewayRejected`, or
/// `Cancelled`. Dropping the handle abandons the result without affecting
/// the request.
pub struct RequestHandle {
    request_id: u64,
    rx: Receiver<RequestOutcome>,
    cmd_tx: Sender<Command>,
}

impl RequestHandle {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Block until the request resolves
    pub fn wait(&self) -> RequestOutcome {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            // Loop shut down before resolving; counts as cancellation
            Err(_) => Err(ClientError::Cancelled),
        }
    }

    /// Block up to `timeout`; None when still outstanding
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RequestOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Some(Err(ClientError::Cancelled))
            }
        }
    }

    /// Withdraw the request before its deadline. The pending is removed
    /// without invoking its callback; a late gateway response is dropped.
    pub fn cancel(self) {
        let _ = self.cmd_tx.send(Command::Cancel { request_id: self.request_id });
    }
}

/// Shared plumbing behind both facades
struct SessionHandle {
    cmd_tx: Sender<Command>,
    shared: Arc<SessionShared>,
    join: Option<JoinHandle<()>>,
}

impl SessionHandle {
    fn spawn(
        role: SessionRole,
        flow_dir: &Path,
        front_addr: &str,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let addr: FrontAddr = front_addr
            .parse()
            .map_err(|e| ClientError::Connection(format!("{}", e)))?;

        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(SessionShared::new());

        // Flow store open + replay happen here so startup failures surface
        // to the caller instead of dying inside the loop thread
        let core = SessionCore::new(role, addr, flow_dir, config, cmd_rx, shared.clone())?;

        let join = thread::Builder::new()
            .name(format!("front-session-{}", role.tag_lower()))
            .spawn(move || core.run())
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        Ok(Self { cmd_tx, shared, join: Some(join) })
    }

    fn command(&self, cmd: Command) -> ClientResult<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| ClientError::Connection("session closed".to_string()))
    }

    fn request(&self, body: RequestBody) -> ClientResult<RequestHandle> {
        let (waiter, rx) = bounded(1);
        let (id_tx, id_rx) = bounded(1);
        self.command(Command::Request { body, waiter, id_tx })?;
        let request_id = id_rx
            .recv()
            .map_err(|_| ClientError::Connection("session closed".to_string()))?;
        Ok(RequestHandle { request_id, rx, cmd_tx: self.cmd_tx.clone() })
    }

    fn login(&self, credentials: Credentials) -> ClientResult<RequestHandle> {
        let (waiter, rx) = bounded(1);
        let (id_tx, id_rx) = bounded(1);
        self.command(Command::Login { credentials, waiter, id_tx })?;
        let request_id = id_rx
            .recv()
            .map_err(|_| ClientError::Connection("session closed".to_string()))?;
        Ok(RequestHandle { request_id, rx, cmd_tx: self.cmd_tx.clone() })
    }

    fn on_event(
        &self,
        kind: EventKind,
        handler: Box<dyn Fn(&Event) + Send>,
    ) -> ClientResult<()> {
        self.command(Command::RegisterHandler { kind, handler })
    }

    fn snapshot(&self) -> ClientResult<SessionSnapshot> {
        let (reply, rx) = bounded(1);
        self.command(Command::Snapshot { reply })?;
        rx.recv().map_err(|_| ClientError::Connection("session closed".to_string()))
    }

    fn close(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Trading session client
pub struct TraderClient {
    session: SessionHandle,
}

impl TraderClient {
    /// Create a trading client with its flow directory (created with
    /// parents if missing) and front address, e.g.
    /// `tcp://180.168.146.187:10202`
    pub fn create<P: AsRef<Path>>(flow_dir: P, front_addr: &str) -> ClientResult<Self> {
        Self::create_with(flow_dir, front_addr, SessionConfig::default())
    }

    pub fn create_with<P: AsRef<Path>>(
        flow_dir: P,
        front_addr: &str,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let session =
            SessionHandle::spawn(SessionRole::Trader, flow_dir.as_ref(), front_addr, config)?;
        Ok(Self { session })
    }

    pub fn api_version(&self) -> &'static str {
        API_VERSION
    }

    /// Start connecting; progress is reported via `on_connection_state_change`
    pub fn connect(&self) -> ClientResult<()> {
        self.session.command(Command::Connect)
    }

    pub fn authenticate(&self, auth: AuthInfo) -> ClientResult<RequestHandle> {
        self.session.request(RequestBody::Authenticate(auth))
    }

    pub fn login(&self, credentials: Credentials) -> ClientResult<RequestHandle> {
        self.session.login(credentials)
    }

    pub fn logout(&self) -> ClientResult<RequestHandle> {
        self.session.request(RequestBody::Logout)
    }

    /// Place an order; resolves `OrderAccepted { order_id }` on success.
    /// Never auto-retried — resubmit with the same `order_ref` to stay safe
    /// against duplicates.
    pub fn place_order(&self, order: OrderInput) -> ClientResult<RequestHandle> {
        self.session.request(RequestBody::OrderInsert(order))
    }

    pub fn cancel_order(&self, order_id: u64) -> ClientResult<RequestHandle> {
        self.session.request(RequestBody::OrderCancel { order_id })
    }

    pub fn query_positions(&self) -> ClientResult<RequestHandle> {
        self.session.request(RequestBody::QueryPositions)
    }

    pub fn query_account(&self) -> ClientResult<RequestHandle> {
        self.session.request(RequestBody::QueryAccount)
    }

    pub fn on_order_update(
        &self,
        f: impl Fn(&OrderUpdate) + Send + 'static,
    ) -> ClientResult<()> {
        self.session.on_event(
            EventKind::OrderUpdate,
            Box::new(move |ev| {
                if let Event::OrderUpdate(update) = ev {
                    f(update);
                }
            }),
        )
    }

    pub fn on_connection_state_change(
        &self,
        f: impl Fn(SessionState) + Send + 'static,
    ) -> ClientResult<()> {
        self.session.on_event(
            EventKind::ConnectionState,
            Box::new(move |ev| {
                if let Event::ConnectionState(state) = ev {
                    f(*state);
                }
            }),
        )
    }

    pub fn state(&self) -> SessionState {
        self.session.shared.state()
    }

    /// Trading day from the login acknowledgement, once logged in
    pub fn trading_day(&self) -> Option<String> {
        self.session.shared.trading_day()
    }

    /// True once a mid-session flow write failed; the session continues but
    /// the durability guarantee is void until restart
    pub fn is_storage_degraded(&self) -> bool {
        self.session.shared.storage_degraded()
    }

    /// Dispatcher/session bookkeeping for diagnostics and tests
    pub fn snapshot(&self) -> ClientResult<SessionSnapshot> {
        self.session.snapshot()
    }

    /// Cancel in-flight requests, flush the flow log, drop the connection
    pub fn close(&mut self) {
        self.session.close();
    }
}

/// Market data session client
pub struct MarketDataClient {
    session: SessionHandle,
}

impl MarketDataClient {
    pub fn create<P: AsRef<Path>>(flow_dir: P, front_addr: &str) -> ClientResult<Self> {
        Self::create_with(flow_dir, front_addr, SessionConfig::default())
    }

    pub fn create_with<P: AsRef<Path>>(
        flow_dir: P,
        front_addr: &str,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let session =
            SessionHandle::spawn(SessionRole::MarketData, flow_dir.as_ref(), front_addr, config)?;
        Ok(Self { session })
    }

    pub fn api_version(&self) -> &'static str {
        API_VERSION
    }

    pub fn connect(&self) -> ClientResult<()> {
        self.session.command(Command::Connect)
    }

    pub fn login(&self, credentials: Credentials) -> ClientResult<RequestHandle> {
        self.session.login(credentials)
    }

    /// Subscribe to quote pushes. Idempotent: instruments already
    /// subscribed are filtered out, and an all-duplicate call resolves
    /// immediately without a gateway round trip.
    pub fn subscribe_quote(&self, instruments: &[&str]) -> ClientResult<RequestHandle> {
        let ids = instruments.iter().map(|s| s.to_string()).collect();
        self.session.request(RequestBody::Subscribe(ids))
    }

    /// Unsubscribe; instruments not currently subscribed are a no-op
    pub fn unsubscribe_quote(&self, instruments: &[&str]) -> ClientResult<RequestHandle> {
        let ids = instruments.iter().map(|s| s.to_string()).collect();
        self.session.request(RequestBody::Unsubscribe(ids))
    }

    pub fn on_quote(&self, f: impl Fn(&QuoteTick) + Send + 'static) -> ClientResult<()> {
        self.session.on_event(
            EventKind::Quote,
            Box::new(move |ev| {
                if let Event::Quote(tick) = ev {
                    f(tick);
                }
            }),
        )
    }

    pub fn on_connection_state_change(
        &self,
        f: impl Fn(SessionState) + Send + 'static,
    ) -> ClientResult<()> {
        self.session.on_event(
            EventKind::ConnectionState,
            Box::new(move |ev| {
                if let Event::ConnectionState(state) = ev {
                    f(*state);
                }
            }),
        )
    }

    pub fn state(&self) -> SessionState {
        self.session.shared.state()
    }

    pub fn is_storage_degraded(&self) -> bool {
        self.session.shared.storage_degraded()
    }

    pub fn snapshot(&self) -> ClientResult<SessionSnapshot> {
        self.session.snapshot()
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

/// Decode helpers for common response shapes
pub fn expect_positions(outcome: RequestOutcome) -> ClientResult<Vec<Position>> {
    match outcome? {
        ResponseBody::Positions(positions) => Ok(positions),
        other => Err(ClientError::Connection(format!("unexpected response: {:?}", other))),
    }
}

pub fn expect_account(outcome: RequestOutcome) -> ClientResult<AccountSnapshot> {
    match outcome? {
        ResponseBody::Account(account) => Ok(account),
        other => Err(ClientError::Connection(format!("unexpected response: {:?}", other))),
    }
}

pub fn expect_order_id(outcome: RequestOutcome) -> ClientResult<u64> {
    match outcome? {
        ResponseBody::OrderAccepted { order_id } => Ok(order_id),
        other => Err(ClientError::Connection(format!("unexpected response: {:?}", other))),
    }
}
