/// Mock front gateway for testing
///
/// Speaks the real wire protocol over real TCP: acks handshakes, echoes
/// heartbeats, answers queries with canned data, and lets tests inject
/// pushes and failure modes (silence for timeouts, credential checks for
/// auth rejection).
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::models::{AccountSnapshot, OrderUpdate, Position, QuoteTick};
use crate::record::{record_body_len, RECORD_HEADER_SIZE};
use crate::wire::messages::{decode_body, encode_body, error_codes};
use crate::wire::{Frame, FrameKind, GatewayError, LoginAck, RequestBody, ResponseBody};

struct MockState {
    expected_password: Mutex<Option<String>>,
    /// Drop (but record) all requests; used to force client timeouts
    silent: AtomicBool,
    /// last_seq carried by each received login, in arrival order
    login_seqs: Mutex<Vec<u64>>,
    requests: Mutex<Vec<RequestBody>>,
    positions: Mutex<Vec<Position>>,
    next_order_id: AtomicU64,
    next_session_id: AtomicU64,
    conns: Mutex<Vec<Arc<Mutex<TcpStream>>>>,
}

pub struct MockFront {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockFront {
    /// Bind an ephemeral port and start accepting sessions
    pub fn spawn() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            expected_password: Mutex::new(None),
            silent: AtomicBool::new(false),
            login_seqs: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            positions: Mutex::new(Vec::new()),
            next_order_id: AtomicU64::new(1),
            next_session_id: AtomicU64::new(1),
            conns: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let writer = match stream.try_clone() {
                            Ok(w) => Arc::new(Mutex::new(w)),
                            Err(_) => continue,
                        };
                        accept_state.conns.lock().unwrap().push(writer.clone());
                        let conn_state = accept_state.clone();
                        thread::spawn(move || serve_session(stream, writer, conn_state));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self { addr, state })
    }

    /// Scheme-qualified endpoint for client construction
    pub fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    /// Reject logins whose password differs
    pub fn require_password(&self, password: &str) {
        *self.state.expected_password.lock().unwrap() = Some(password.to_string());
    }

    /// Stop answering requests (heartbeats still echo)
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::SeqCst);
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        *self.state.positions.lock().unwrap() = positions;
    }

    /// last_seq of every login received, in order
    pub fn login_seqs(&self) -> Vec<u64> {
        self.state.login_seqs.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RequestBody> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn push_quote(&self, tick: QuoteTick) {
        self.push(&encode_body(&crate::wire::PushBody::Quote(tick)));
    }

    pub fn push_order_update(&self, update: OrderUpdate) {
        self.push(&encode_body(&crate::wire::PushBody::OrderUpdate(update)));
    }

    fn push(&self, body: &[u8]) {
        let bytes = Frame::push(body.to_vec()).encode();
        let mut conns = self.state.conns.lock().unwrap();
        conns.retain(|conn| conn.lock().unwrap().write_all(&bytes).is_ok());
    }

    /// Sever every live session (simulates a gateway failover)
    pub fn drop_connections(&self) {
        let mut conns = self.state.conns.lock().unwrap();
        for conn in conns.drain(..) {
            let _ = conn.lock().unwrap().shutdown(std::net::Shutdown::Both);
        }
    }
}

fn serve_session(mut stream: TcpStream, writer: Arc<Mutex<TcpStream>>, state: Arc<MockState>) {
    loop {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let body_len = match record_body_len(&header) {
            Ok(n) => n,
            Err(_) => return,
        };
        let mut buf = vec![0u8; RECORD_HEADER_SIZE + body_len];
        buf[..RECORD_HEADER_SIZE].copy_from_slice(&header);
        if stream.read_exact(&mut buf[RECORD_HEADER_SIZE..]).is_err() {
            return;
        }

        let frame = match Frame::decode(&buf) {
            Ok(f) => f,
            Err(_) => continue,
        };

        match frame.kind {
            FrameKind::Heartbeat => {
                let reply = Frame::heartbeat().encode();
                if writer.lock().unwrap().write_all(&reply).is_err() {
                    return;
                }
            }
            FrameKind::Request => {
                let request: RequestBody = match decode_body(&frame.body) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                state.requests.lock().unwrap().push(request.clone());

                if let RequestBody::Login(login) = &request {
                    state.login_seqs.lock().unwrap().push(login.last_seq);
                }

                if state.silent.load(Ordering::SeqCst) {
                    continue;
                }

                let response = answer(&request, &state);
                let bytes = Frame::response(frame.request_id, encode_body(&response)).encode();
                if writer.lock().unwrap().write_all(&bytes).is_err() {
                    return;
                }
            }
            _ => {}
        }
    }
}

fn answer(request: &RequestBody, state: &MockState) -> ResponseBody {
    match request {
        RequestBody::Authenticate(_) => ResponseBody::AuthenticateAck,
        RequestBody::Login(login) => {
            let expected = state.expected_password.lock().unwrap().clone();
            match expected {
                Some(pw) if login.credentials.password != pw => {
                    ResponseBody::Error(GatewayError {
                        code: error_codes::AUTH_REJECTED,
                        message: "invalid credentials".to_string(),
                    })
                }
                _ => ResponseBody::LoginAck(LoginAck {
                    trading_day: chrono::Utc::now().format("%Y%m%d").to_string(),
                    session_id: state.next_session_id.fetch_add(1, Ordering::SeqCst),
                }),
            }
        }
        RequestBody::Logout => ResponseBody::LogoutAck,
        RequestBody::OrderInsert(_) => ResponseBody::OrderAccepted {
            order_id: state.next_order_id.fetch_add(1, Ordering::SeqCst),
        },
        RequestBody::OrderCancel { order_id } => ResponseBody::CancelAck { order_id: *order_id },
        RequestBody::QueryPositions => {
            ResponseBody::Positions(state.positions.lock().unwrap().clone())
        }
        RequestBody::QueryAccount => ResponseBody::Account(AccountSnapshot {
            balance: 1_000_000,
            available: 900_000,
            frozen_margin: 100_000,
        }),
        RequestBody::Subscribe(ids) => ResponseBody::Subscribed(ids.clone()),
        RequestBody::Unsubscribe(ids) => ResponseBody::Unsubscribed(ids.clone()),
    }
}
