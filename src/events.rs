//! Push-event surface
//!
//! Handlers are registered per event kind and invoked synchronously on the
//! owning session loop, in registration order. Connection-state changes are
//! always delivered, even when the underlying cause was retried internally.

use crate::models::{OrderUpdate, QuoteTick};
use crate::session::SessionState;

/// Event kinds a handler can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Quote,
    OrderUpdate,
    ConnectionState,
}

/// Payload delivered to registered handlers
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Quote(QuoteTick),
    OrderUpdate(OrderUpdate),
    ConnectionState(SessionState),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Quote(_) => EventKind::Quote,
            Event::OrderUpdate(_) => EventKind::OrderUpdate,
            Event::ConnectionState(_) => EventKind::ConnectionState,
        }
    }
}

/// Callback invoked on the session loop thread
pub type EventHandler = Box<dyn Fn(&Event) + Send>;
