//! Request/response dispatcher
//!
//! Owns every PendingRequest for the session. Outbound requests get a
//! monotonically increasing identifier and a capacity-1 response channel;
//! inbound frames either settle the matching pending (exactly once, with
//! success, a gateway rejection, a timeout, or a cancellation) or are routed
//! as unsolicited events to the handlers registered for their kind, in
//! registration order. The dispatcher never retries: not every request kind
//! is idempotent, so retry policy stays with the caller.

use std::collections::HashMap;
use std::time::Instant;

use crossbeam_channel::Sender;
use indexmap::IndexSet;

use crate::error::ClientError;
use crate::events::{Event, EventHandler, EventKind};
use crate::wire::messages::error_codes;
use crate::wire::ResponseBody;

/// Final outcome of one correlated request
pub type RequestOutcome = Result<ResponseBody, ClientError>;

/// Capacity-1 channel sender resolving one request
pub type Waiter = Sender<RequestOutcome>;

struct PendingRequest {
    /// Login/authenticate: a gateway error here is fatal to the session
    is_auth: bool,
    deadline: Instant,
    /// None for internally issued requests (gap-recovery relogin) and for
    /// pendings re-armed from flow replay
    waiter: Option<Waiter>,
}

/// What a settled response meant, for the session FSM
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub is_auth: bool,
    pub outcome: RequestOutcome,
}

/// Observable dispatcher bookkeeping, comparable across restarts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    pub next_request_id: u64,
    pub pending_ids: Vec<u64>,
    pub subscriptions: Vec<String>,
}

pub struct Dispatcher {
    next_request_id: u64,
    pending: HashMap<u64, PendingRequest>,
    handlers: HashMap<EventKind, Vec<EventHandler>>,
    subscriptions: IndexSet<String>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            next_request_id: 1,
            pending: HashMap::new(),
            handlers: HashMap::new(),
            subscriptions: IndexSet::new(),
        }
    }

    /// Assign the next request identifier and register the pending.
    /// Registration happens before the frame is written to the socket.
    pub fn issue(&mut self, is_auth: bool, deadline: Instant, waiter: Option<Waiter>) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        self.pending.insert(id, PendingRequest { is_auth, deadline, waiter });
        id
    }

    /// Re-arm a request seen in the flow log during replay. Keeps the id
    /// watermark monotonic; the waiter died with the previous process.
    pub fn replay_request(&mut self, id: u64, is_auth: bool, deadline: Instant) {
        if id >= self.next_request_id {
            self.next_request_id = id + 1;
        }
        self.pending.insert(id, PendingRequest { is_auth, deadline, waiter: None });
    }

    /// Settle the pending matching `request_id` with a response body.
    /// Returns None for unmatched ids (late response after timeout/cancel).
    pub fn resolve(&mut self, request_id: u64, body: ResponseBody) -> Option<Resolution> {
        let pending = self.pending.remove(&request_id)?;

        let outcome: RequestOutcome = match body {
            ResponseBody::Error(err) => {
                if pending.is_auth || err.code == error_codes::AUTH_REJECTED {
                    Err(ClientError::Authentication(err.message))
                } else {
                    Err(ClientError::GatewayRejected { code: err.code, message: err.message })
                }
            }
            ok => Ok(ok),
        };

        if let Some(waiter) = pending.waiter {
            // Receiver may have been dropped; that is the caller's choice
            let _ = waiter.send(outcome.clone());
        }

        Some(Resolution { is_auth: pending.is_auth, outcome })
    }

    /// Settle a response and fold its side effects into dispatcher state.
    ///
    /// Subscription acks update the active set whether or not a pending
    /// still matches: the ack reflects gateway state either way. Used by
    /// both the live path and flow replay, which is what makes recovery
    /// reconstruct the same bookkeeping as an uninterrupted run.
    pub fn apply_response(&mut self, request_id: u64, body: ResponseBody) -> Option<Resolution> {
        match &body {
            ResponseBody::Subscribed(ids) => self.apply_subscribed(ids),
            ResponseBody::Unsubscribed(ids) => self.apply_unsubscribed(ids),
            _ => {}
        }
        self.resolve(request_id, body)
    }

    /// Remove a pending without resolving its waiter
    pub fn cancel(&mut self, request_id: u64) -> bool {
        self.pending.remove(&request_id).is_some()
    }

    /// Expire every pending whose deadline has passed, resolving `Timeout`
    pub fn expire(&mut self, now: Instant) -> Vec<u64> {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| now >= p.deadline)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(p) = self.pending.remove(id) {
                if let Some(waiter) = p.waiter {
                    let _ = waiter.send(Err(ClientError::Timeout));
                }
            }
        }
        expired
    }

    /// Resolve every in-flight pending with the given error (shutdown path)
    pub fn fail_all(&mut self, err: ClientError) -> usize {
        let drained = self.pending.len();
        for (_, p) in self.pending.drain() {
            if let Some(waiter) = p.waiter {
                let _ = waiter.send(Err(err.clone()));
            }
        }
        drained
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_request_id
    }

    // ---- push/event surface ----

    pub fn register_handler(&mut self, kind: EventKind, handler: EventHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Deliver an event to every handler of its kind, in registration order
    pub fn emit(&self, event: &Event) -> usize {
        match self.handlers.get(&event.kind()) {
            Some(list) => {
                for handler in list {
                    handler(event);
                }
                list.len()
            }
            None => 0,
        }
    }

    // ---- subscription set ----

    /// Instruments from `ids` not currently subscribed
    pub fn subscription_gaps(&self, ids: &[String]) -> Vec<String> {
        let mut fresh = Vec::new();
        for id in ids {
            if !self.subscriptions.contains(id) && !fresh.contains(id) {
                fresh.push(id.clone());
            }
        }
        fresh
    }

    /// Instruments from `ids` currently subscribed
    pub fn subscription_hits(&self, ids: &[String]) -> Vec<String> {
        let mut hits = Vec::new();
        for id in ids {
            if self.subscriptions.contains(id) && !hits.contains(id) {
                hits.push(id.clone());
            }
        }
        hits
    }

    pub fn apply_subscribed(&mut self, ids: &[String]) {
        for id in ids {
            self.subscriptions.insert(id.clone());
        }
    }

    pub fn apply_unsubscribed(&mut self, ids: &[String]) {
        for id in ids {
            self.subscriptions.shift_remove(id);
        }
    }

    /// Drop the active set; a fresh transport starts unsubscribed and the
    /// caller resubscribes explicitly
    pub fn clear_subscriptions(&mut self) -> usize {
        let n = self.subscriptions.len();
        self.subscriptions.clear();
        n
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        let mut pending_ids: Vec<u64> = self.pending.keys().copied().collect();
        pending_ids.sort_unstable();
        DispatcherSnapshot {
            next_request_id: self.next_request_id,
            pending_ids,
            subscriptions: self.subscriptions(),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
