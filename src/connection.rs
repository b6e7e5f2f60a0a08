//! Connection manager
//!
//! Owns one TCP connection to the front gateway. A dedicated reader thread
//! pulls record-framed frames off the socket and hands them to the session
//! loop; the loop keeps the writer half. Heartbeat bookkeeping lives here
//! (last send/receive instants); the session loop drives the timers and
//! decides when the link is dead.
//!
//! Reconnection policy is bounded exponential backoff: delays double from a
//! configured initial value up to a cap, for at most a configured number of
//! attempts per outage.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::endpoint::FrontAddr;
use crate::error::ClientError;
use crate::record::{record_body_len, RECORD_HEADER_SIZE};
use crate::wire::Frame;

/// Network input delivered to the session loop
///
/// `conn_id` guards against events from a connection the loop has already
/// abandoned: a stale reader thread may still flush a `Down` after a
/// reconnect replaced it.
#[derive(Debug)]
pub enum NetEvent {
    Frame { conn_id: u64, frame: Frame },
    Down { conn_id: u64, reason: String },
}

#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    conn_id: u64,
    last_rx: Instant,
    last_tx: Instant,
}

impl Connection {
    /// Connect and start the reader thread
    pub fn open(
        addr: &FrontAddr,
        connect_timeout: Duration,
        conn_id: u64,
        tx: Sender<NetEvent>,
    ) -> Result<Self, ClientError> {
        let target = addr.socket_addr();
        let resolved = target
            .to_socket_addrs()
            .map_err(|e| ClientError::Connection(format!("resolve {}: {}", target, e)))?
            .next()
            .ok_or_else(|| ClientError::Connection(format!("no address for {}", target)))?;

        let stream = TcpStream::connect_timeout(&resolved, connect_timeout)
            .map_err(|e| ClientError::Connection(format!("connect {}: {}", target, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let reader = stream
            .try_clone()
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        thread::Builder::new()
            .name(format!("front-reader-{}", conn_id))
            .spawn(move || read_frames(reader, conn_id, tx))
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        log::info!("[CONN] Connected to {} (conn_id={})", addr, conn_id);

        let now = Instant::now();
        Ok(Self { stream, conn_id, last_rx: now, last_tx: now })
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Write one frame to the socket
    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), ClientError> {
        self.send_bytes(&frame.encode())
    }

    /// Write already-encoded frame bytes (the flow log needs the exact
    /// bytes, so the session encodes once and passes them through)
    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream
            .write_all(bytes)
            .map_err(|e| ClientError::Connection(format!("send: {}", e)))?;
        self.last_tx = Instant::now();
        Ok(())
    }

    /// Record that traffic arrived (any frame, heartbeats included)
    pub fn note_rx(&mut self) {
        self.last_rx = Instant::now();
    }

    /// True when the send side has been idle long enough to owe a heartbeat
    pub fn heartbeat_due(&self, interval: Duration, now: Instant) -> bool {
        now.duration_since(self.last_tx) >= interval
    }

    /// True when nothing has arrived for interval + grace: the link is dead
    pub fn is_dead(&self, interval: Duration, grace: Duration, now: Instant) -> bool {
        now.duration_since(self.last_rx) >= interval + grace
    }

    pub fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Reader thread body: record header, body, decode, forward
fn read_frames(mut stream: TcpStream, conn_id: u64, tx: Sender<NetEvent>) {
    loop {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        if let Err(e) = stream.read_exact(&mut header) {
            let _ = tx.send(NetEvent::Down { conn_id, reason: e.to_string() });
            return;
        }

        let body_len = match record_body_len(&header) {
            Ok(n) => n,
            Err(e) => {
                let _ = tx.send(NetEvent::Down {
                    conn_id,
                    reason: format!("bad record header: {}", e),
                });
                return;
            }
        };

        let mut buf = vec![0u8; RECORD_HEADER_SIZE + body_len];
        buf[..RECORD_HEADER_SIZE].copy_from_slice(&header);
        if let Err(e) = stream.read_exact(&mut buf[RECORD_HEADER_SIZE..]) {
            let _ = tx.send(NetEvent::Down { conn_id, reason: e.to_string() });
            return;
        }

        match Frame::decode(&buf) {
            Ok(frame) => {
                if tx.send(NetEvent::Frame { conn_id, frame }).is_err() {
                    // Session loop is gone
                    return;
                }
            }
            Err(e) => {
                // Framing is intact (lengths matched), the payload is not
                log::warn!("[CONN] Dropping undecodable frame: {}", e);
            }
        }
    }
}

/// Bounded exponential backoff for reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempts: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self { initial, max, max_attempts, attempts: 0, next_delay: initial }
    }

    /// Delay before the next attempt, or None when attempts are exhausted
    pub fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.next_delay;
        self.next_delay = std::cmp::min(self.next_delay * 2, self.max);
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Back to the initial delay after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_delay = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(4), 10);
        let delays: Vec<u64> = (0..5).map(|_| b.next().unwrap().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 4, 4]);
    }

    #[test]
    fn test_backoff_bounded_attempts() {
        let mut b = Backoff::new(Duration::from_millis(10), Duration::from_millis(40), 3);
        assert!(b.next().is_some());
        assert!(b.next().is_some());
        assert!(b.next().is_some());
        assert!(b.next().is_none());
        assert_eq!(b.attempts(), 3);
    }

    #[test]
    fn test_backoff_reset() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(8), 5);
        b.next();
        b.next();
        b.reset();
        assert_eq!(b.next().unwrap(), Duration::from_secs(1));
        assert_eq!(b.attempts(), 1);
    }

    #[test]
    fn test_connect_refused_classified() {
        let addr: FrontAddr = "tcp://127.0.0.1:1".parse().unwrap();
        let (tx, _rx) = crossbeam_channel::unbounded();
        let err = Connection::open(&addr, Duration::from_millis(200), 1, tx).unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }
}
