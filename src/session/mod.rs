//! Session core
//!
//! One dedicated loop thread per client instance owns the Session, the
//! Dispatcher and the Flow Log Store; nothing else mutates them. Input is
//! merged from three sources: facade commands, decoded frames from the
//! reader thread, and a periodic tick that drives heartbeats, request
//! deadlines and reconnect scheduling. All callback invocation (response
//! resolution, push delivery, state-change events) happens on this thread,
//! which is what preserves per-instance ordering.

pub mod state;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::connection::{Backoff, Connection, NetEvent};
use crate::dispatcher::{Dispatcher, DispatcherSnapshot, Waiter};
use crate::endpoint::FrontAddr;
use crate::error::ClientError;
use crate::events::{Event, EventHandler, EventKind};
use crate::flow::{Direction, FlowLogStore};
use crate::models::Credentials;
use crate::wire::messages::{decode_body, encode_body};
use crate::wire::{Frame, FrameKind, LoginRequest, PushBody, RequestBody, ResponseBody, ResumeMode};

pub use state::{SessionEvent, SessionFsm, SessionState};

/// Loop tick period; bounds timer resolution for heartbeats and deadlines
const TICK: Duration = Duration::from_millis(50);

/// Which client owns this session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Trader,
    MarketData,
}

impl SessionRole {
    fn tag(&self) -> &'static str {
        match self {
            SessionRole::Trader => "TRADER",
            SessionRole::MarketData => "MD",
        }
    }

    pub(crate) fn tag_lower(&self) -> &'static str {
        match self {
            SessionRole::Trader => "trader",
            SessionRole::MarketData => "md",
        }
    }
}

/// Session tunables
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// Send a heartbeat after this much send-side idle
    pub heartbeat_interval: Duration,
    /// Declare the link dead after interval + grace without inbound traffic
    pub heartbeat_grace: Duration,
    pub request_timeout: Duration,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_max_attempts: u32,
    pub resume: ResumeMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_grace: Duration::from_secs(15),
            request_timeout: Duration::from_secs(10),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_max_attempts: 10,
            resume: ResumeMode::Resume,
        }
    }
}

/// Commands from the client facade to the session loop
pub enum Command {
    Connect,
    Login { credentials: Credentials, waiter: Waiter, id_tx: Sender<u64> },
    Request { body: RequestBody, waiter: Waiter, id_tx: Sender<u64> },
    Cancel { request_id: u64 },
    RegisterHandler { kind: EventKind, handler: EventHandler },
    Snapshot { reply: Sender<SessionSnapshot> },
    Close,
}

/// Observable session state for diagnostics and tests
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub last_seq: u64,
    pub storage_degraded: bool,
    pub dispatcher: DispatcherSnapshot,
}

/// State mirror readable from the facade without touching the loop
pub struct SessionShared {
    state: Mutex<SessionState>,
    degraded: AtomicBool,
    trading_day: Mutex<Option<String>>,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            degraded: AtomicBool::new(false),
            trading_day: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn storage_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn trading_day(&self) -> Option<String> {
        self.trading_day.lock().unwrap().clone()
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct SessionCore {
    role: SessionRole,
    addr: FrontAddr,
    config: SessionConfig,
    cmd_rx: Receiver<Command>,
    net_rx: Receiver<NetEvent>,
    net_tx: Sender<NetEvent>,
    fsm: SessionFsm,
    dispatcher: Dispatcher,
    flow: FlowLogStore,
    conn: Option<Connection>,
    next_conn_id: u64,
    /// Highest sequence number assigned this session (durable or not)
    last_seq: u64,
    credentials: Option<Credentials>,
    authenticated_once: bool,
    backoff: Backoff,
    reconnect_at: Option<Instant>,
    auto_reconnect: bool,
    degraded: bool,
    shared: Arc<SessionShared>,
}

impl SessionCore {
    /// Open the flow store, replay it to rebuild dispatcher bookkeeping,
    /// and assemble the loop state. Storage failure here is fatal: without
    /// the log we cannot guarantee exactly-once sequence continuation.
    pub(crate) fn new(
        role: SessionRole,
        addr: FrontAddr,
        flow_dir: &Path,
        config: SessionConfig,
        cmd_rx: Receiver<Command>,
        shared: Arc<SessionShared>,
    ) -> Result<Self, ClientError> {
        let flow = FlowLogStore::open(flow_dir).map_err(|e| ClientError::Storage(e.to_string()))?;

        let mut dispatcher = Dispatcher::new();
        let last_seq = flow.last_seq();
        if last_seq > 0 {
            let replay = flow.replay().map_err(|e| ClientError::Storage(e.to_string()))?;
            let restored = recover_dispatcher(&mut dispatcher, replay, config.request_timeout);
            log::info!(
                "[{}] Recovered {} flow records (last_seq={}, next_request_id={})",
                role.tag(),
                restored,
                last_seq,
                dispatcher.next_request_id()
            );
        }

        let backoff = Backoff::new(
            config.reconnect_initial_delay,
            config.reconnect_max_delay,
            config.reconnect_max_attempts,
        );
        let (net_tx, net_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            role,
            addr,
            config,
            cmd_rx,
            net_rx,
            net_tx,
            fsm: SessionFsm::new(),
            dispatcher,
            flow,
            conn: None,
            next_conn_id: 1,
            last_seq,
            credentials: None,
            authenticated_once: false,
            backoff,
            reconnect_at: None,
            auto_reconnect: false,
            degraded: false,
            shared,
        })
    }

    fn tag(&self) -> &'static str {
        self.role.tag()
    }

    /// Loop until closed
    pub(crate) fn run(mut self) {
        enum Input {
            Cmd(Command),
            CmdClosed,
            Net(NetEvent),
            Tick,
        }

        let cmd_rx = self.cmd_rx.clone();
        let net_rx = self.net_rx.clone();

        loop {
            let input = crossbeam_channel::select! {
                recv(cmd_rx) -> msg => match msg {
                    Ok(cmd) => Input::Cmd(cmd),
                    // Facade dropped without an explicit close
                    Err(_) => Input::CmdClosed,
                },
                recv(net_rx) -> msg => match msg {
                    Ok(ev) => Input::Net(ev),
                    Err(_) => Input::Tick,
                },
                default(TICK) => Input::Tick,
            };

            match input {
                Input::Cmd(cmd) => self.handle_command(cmd),
                Input::CmdClosed => self.shutdown(),
                Input::Net(ev) => self.handle_net(ev),
                Input::Tick => {}
            }

            self.on_tick(Instant::now());

            if self.fsm.is_terminal() {
                break;
            }
        }
        log::info!("[{}] Session loop exited", self.tag());
    }

    // ---- commands ----

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => {
                if self.fsm.state() != SessionState::Disconnected {
                    log::debug!("[{}] connect ignored in state {}", self.tag(), self.fsm.state());
                    return;
                }
                self.auto_reconnect = true;
                self.backoff.reset();
                self.reconnect_at = None;
                self.try_connect();
            }
            Command::Login { credentials, waiter, id_tx } => {
                self.credentials = Some(credentials.clone());
                let body = RequestBody::Login(LoginRequest {
                    credentials,
                    last_seq: self.last_seq,
                    resume: self.config.resume,
                });
                self.send_request(body, Some(waiter), Some(id_tx));
            }
            Command::Request { body, waiter, id_tx } => match body {
                RequestBody::Subscribe(ids) => {
                    let fresh = self.dispatcher.subscription_gaps(&ids);
                    if fresh.is_empty() {
                        // Already subscribed everywhere: local no-op
                        let _ = id_tx.send(0);
                        let _ = waiter.send(Ok(ResponseBody::Subscribed(Vec::new())));
                        return;
                    }
                    self.send_request(RequestBody::Subscribe(fresh), Some(waiter), Some(id_tx));
                }
                RequestBody::Unsubscribe(ids) => {
                    let hits = self.dispatcher.subscription_hits(&ids);
                    if hits.is_empty() {
                        let _ = id_tx.send(0);
                        let _ = waiter.send(Ok(ResponseBody::Unsubscribed(Vec::new())));
                        return;
                    }
                    self.send_request(RequestBody::Unsubscribe(hits), Some(waiter), Some(id_tx));
                }
                other => self.send_request(other, Some(waiter), Some(id_tx)),
            },
            Command::Cancel { request_id } => {
                if self.dispatcher.cancel(request_id) {
                    log::debug!("[{}] request {} cancelled", self.tag(), request_id);
                }
            }
            Command::RegisterHandler { kind, handler } => {
                self.dispatcher.register_handler(kind, handler);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot {
                    state: self.fsm.state(),
                    last_seq: self.last_seq,
                    storage_degraded: self.degraded,
                    dispatcher: self.dispatcher.snapshot(),
                });
            }
            Command::Close => self.shutdown(),
        }
    }

    /// Register the pending, then log and send the frame. Registration
    /// before the write avoids losing a response that races the send.
    fn send_request(
        &mut self,
        body: RequestBody,
        waiter: Option<Waiter>,
        id_tx: Option<Sender<u64>>,
    ) {
        let deadline = Instant::now() + self.config.request_timeout;
        let id = self.dispatcher.issue(body.is_auth(), deadline, waiter);
        if let Some(tx) = id_tx {
            let _ = tx.send(id);
        }

        if matches!(body, RequestBody::Subscribe(_))
            && self.fsm.state() == SessionState::Authenticated
        {
            self.transition(SessionEvent::SubscribeIssued);
        }

        if self.conn.is_none() {
            // No transport: the pending stands and resolves Timeout at its
            // deadline unless a reconnect lands first
            log::debug!("[{}] request {} issued while disconnected", self.tag(), id);
            return;
        }

        let encoded = Frame::request(id, encode_body(&body)).encode();
        self.append_flow(Direction::Outbound, &encoded);
        if let Err(e) = self.conn.as_mut().unwrap().send_bytes(&encoded) {
            self.transport_lost(&e.to_string());
        }
    }

    // ---- network input ----

    fn handle_net(&mut self, ev: NetEvent) {
        match ev {
            NetEvent::Frame { conn_id, frame } => {
                let current = self.conn.as_ref().map(|c| c.conn_id());
                if current != Some(conn_id) {
                    return; // stale reader
                }
                self.conn.as_mut().unwrap().note_rx();

                match frame.kind {
                    FrameKind::Heartbeat => {}
                    FrameKind::Response => self.handle_response(frame),
                    FrameKind::Push => self.handle_push(frame),
                    FrameKind::Request => {
                        log::warn!("[{}] unexpected request frame from gateway", self.tag());
                    }
                }
            }
            NetEvent::Down { conn_id, reason } => {
                let current = self.conn.as_ref().map(|c| c.conn_id());
                if current == Some(conn_id) {
                    self.transport_lost(&reason);
                }
            }
        }
    }

    fn handle_response(&mut self, frame: Frame) {
        self.append_flow(Direction::Inbound, &frame.encode());

        let body: ResponseBody = match decode_body(&frame.body) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("[{}] undecodable response body: {}", self.tag(), e);
                return;
            }
        };

        let login_ack = match &body {
            ResponseBody::LoginAck(ack) => Some(ack.clone()),
            _ => None,
        };
        let subscribed_ok = matches!(&body, ResponseBody::Subscribed(_));

        let resolution = match self.dispatcher.apply_response(frame.request_id, body) {
            Some(r) => r,
            None => {
                log::warn!(
                    "[{}] no pending request for response id={}",
                    self.tag(),
                    frame.request_id
                );
                return;
            }
        };

        if resolution.is_auth {
            match &resolution.outcome {
                Ok(_) => {
                    if let Some(ack) = login_ack {
                        self.on_login_ok(ack.trading_day);
                    }
                    // AuthenticateAck settles its request, no state change
                }
                Err(ClientError::Authentication(msg)) => {
                    let msg = msg.clone();
                    self.on_auth_failed(&msg);
                }
                Err(_) => {}
            }
        } else if subscribed_ok && self.fsm.state() == SessionState::Subscribing {
            self.transition(SessionEvent::SubscribeOk);
        }
    }

    fn handle_push(&mut self, frame: Frame) {
        self.append_flow(Direction::Inbound, &frame.encode());

        let body: PushBody = match decode_body(&frame.body) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("[{}] undecodable push body: {}", self.tag(), e);
                return;
            }
        };

        let event = match body {
            PushBody::Quote(tick) => Event::Quote(tick),
            PushBody::OrderUpdate(update) => Event::OrderUpdate(update),
        };
        if self.dispatcher.emit(&event) == 0 {
            log::debug!("[{}] push with no registered handler", self.tag());
        }
    }

    // ---- state transitions ----

    fn on_login_ok(&mut self, trading_day: String) {
        log::info!("[{}] login ok, trading_day={}", self.tag(), trading_day);
        *self.shared.trading_day.lock().unwrap() = Some(trading_day);
        self.authenticated_once = true;
        self.transition(SessionEvent::LoginOk);
        if self.role == SessionRole::Trader {
            // Trading sessions have no subscription phase
            self.transition(SessionEvent::NoSubscriptions);
        }
    }

    fn on_auth_failed(&mut self, msg: &str) {
        log::error!("[{}] gateway rejected login: {}", self.tag(), msg);
        // Fatal to the session: tear the transport down and do not retry
        self.auto_reconnect = false;
        self.reconnect_at = None;
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        self.transition(SessionEvent::AuthFailed);
    }

    fn try_connect(&mut self) {
        self.transition(SessionEvent::StartConnect);

        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        match Connection::open(&self.addr, self.config.connect_timeout, conn_id, self.net_tx.clone())
        {
            Ok(conn) => {
                self.conn = Some(conn);
                self.backoff.reset();
                self.transition(SessionEvent::TransportUp);

                let dropped = self.dispatcher.clear_subscriptions();
                if dropped > 0 {
                    log::info!(
                        "[{}] {} subscriptions need explicit resubscription",
                        self.tag(),
                        dropped
                    );
                }

                // Gap recovery: a previously authenticated session logs back
                // in with the last known sequence number so the gateway
                // resends only what came after it
                if self.authenticated_once {
                    if let Some(credentials) = self.credentials.clone() {
                        log::info!(
                            "[{}] reissuing login for gap recovery (last_seq={})",
                            self.tag(),
                            self.last_seq
                        );
                        let body = RequestBody::Login(LoginRequest {
                            credentials,
                            last_seq: self.last_seq,
                            resume: self.config.resume,
                        });
                        self.send_request(body, None, None);
                    }
                }
            }
            Err(e) => {
                log::warn!("[{}] connect failed: {}", self.tag(), e);
                self.transition(SessionEvent::ConnectionLost);
                if self.auto_reconnect {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn transport_lost(&mut self, reason: &str) {
        log::warn!("[{}] connection lost: {}", self.tag(), reason);
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        if self.fsm.state() != SessionState::Disconnected {
            self.transition(SessionEvent::ConnectionLost);
        }
        if self.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.backoff.next() {
            Some(delay) => {
                log::info!(
                    "[{}] reconnecting in {:?} (attempt {})",
                    self.tag(),
                    delay,
                    self.backoff.attempts()
                );
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                log::error!("[{}] reconnect attempts exhausted", self.tag());
                self.auto_reconnect = false;
                self.reconnect_at = None;
            }
        }
    }

    fn on_tick(&mut self, now: Instant) {
        let expired = self.dispatcher.expire(now);
        if !expired.is_empty() {
            log::debug!("[{}] {} requests timed out", self.tag(), expired.len());
        }

        let mut lost: Option<String> = None;
        if let Some(conn) = self.conn.as_mut() {
            if conn.is_dead(self.config.heartbeat_interval, self.config.heartbeat_grace, now) {
                lost = Some("heartbeat timeout".to_string());
            } else if conn.heartbeat_due(self.config.heartbeat_interval, now) {
                if let Err(e) = conn.send_frame(&Frame::heartbeat()) {
                    lost = Some(e.to_string());
                }
            }
        }
        if let Some(reason) = lost {
            self.transport_lost(&reason);
        }

        if self.conn.is_none() && self.auto_reconnect && !self.fsm.is_terminal() {
            if let Some(due) = self.reconnect_at {
                if now >= due {
                    self.reconnect_at = None;
                    self.try_connect();
                }
            }
        }
    }

    fn shutdown(&mut self) {
        if self.fsm.is_terminal() {
            return;
        }
        let cancelled = self.dispatcher.fail_all(ClientError::Cancelled);
        if cancelled > 0 {
            log::info!("[{}] cancelled {} in-flight requests", self.tag(), cancelled);
        }
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        if let Err(e) = self.flow.flush() {
            log::error!("[{}] flow flush on close failed: {}", self.tag(), e);
        }
        self.transition(SessionEvent::Close);
    }

    /// Durably record a frame before its send/receive completes. A write
    /// failure mid-session is not fatal: the session continues in
    /// memory-only mode and the degradation is surfaced once.
    fn append_flow(&mut self, direction: Direction, encoded: &[u8]) {
        let seq = self.last_seq + 1;
        self.last_seq = seq;

        if self.degraded {
            return;
        }
        if let Err(e) = self.flow.append(seq, direction, encoded) {
            self.degraded = true;
            self.shared.degraded.store(true, Ordering::SeqCst);
            log::warn!(
                "[{}] flow log unwritable, continuing without durability: {}",
                self.tag(),
                e
            );
        }
    }

    /// Apply an FSM event; on a real change, mirror it and notify handlers
    fn transition(&mut self, event: SessionEvent) {
        match self.fsm.consume(event) {
            Ok(prev) => {
                let state = self.fsm.state();
                if state != prev {
                    log::info!("[{}] {} -> {}", self.tag(), prev, state);
                    *self.shared.state.lock().unwrap() = state;
                    self.dispatcher.emit(&Event::ConnectionState(state));
                }
            }
            Err(e) => log::debug!("[{}] {}", self.tag(), e),
        }
    }
}

/// Rebuild dispatcher bookkeeping from the flow log.
///
/// Outbound requests re-arm pendings (their waiters died with the previous
/// process); inbound responses settle them and re-apply subscription
/// effects, through the same path live traffic takes. Returns the number of
/// records consumed; a corrupt tail ends recovery with a warning.
fn recover_dispatcher(
    dispatcher: &mut Dispatcher,
    replay: crate::flow::FlowReplay,
    request_timeout: Duration,
) -> u64 {
    let mut restored = 0u64;
    let deadline = Instant::now() + request_timeout;

    for item in replay {
        let record = match item {
            Ok(r) => r,
            Err(e) => {
                log::warn!("[FLOW] replay stopped at corrupt tail: {}", e);
                break;
            }
        };

        let frame = match Frame::decode(&record.frame) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("[FLOW] skipping undecodable replayed frame: {}", e);
                continue;
            }
        };

        match (record.direction, frame.kind) {
            (Direction::Outbound, FrameKind::Request) => {
                let is_auth = decode_body::<RequestBody>(&frame.body)
                    .map(|b| b.is_auth())
                    .unwrap_or(false);
                dispatcher.replay_request(frame.request_id, is_auth, deadline);
            }
            (Direction::Inbound, FrameKind::Response) => {
                if let Ok(body) = decode_body::<ResponseBody>(&frame.body) {
                    let _ = dispatcher.apply_response(frame.request_id, body);
                }
            }
            // Pushes leave no dispatcher bookkeeping behind
            (Direction::Inbound, FrameKind::Push) => {}
            _ => {}
        }
        restored += 1;
    }
    restored
}
