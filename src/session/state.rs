//! Session lifecycle state machine
//!
//! `Disconnected -> Connecting -> LoggingIn -> Authenticated -> Subscribing
//! -> Ready`, with `Disconnected` reachable from any non-terminal state on
//! connection loss and `Closed` terminal. Authentication failure returns to
//! `Disconnected` and is never retried automatically; transient loss is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// States of a gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    LoggingIn,
    Authenticated,
    Subscribing,
    Ready,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::LoggingIn => "logging_in",
            Self::Authenticated => "authenticated",
            Self::Subscribing => "subscribing",
            Self::Ready => "ready",
            Self::Closed => "closed",
        }
    }

    /// True while a transport is established (heartbeats flow)
    pub fn transport_up(&self) -> bool {
        matches!(
            self,
            Self::LoggingIn | Self::Authenticated | Self::Subscribing | Self::Ready
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events driving the session FSM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connect attempt is starting
    StartConnect,
    /// Connection manager reports the transport established
    TransportUp,
    /// Login acknowledged by the gateway
    LoginOk,
    /// Gateway rejected login/authenticate
    AuthFailed,
    /// A subscription handshake went out
    SubscribeIssued,
    /// Subscription acknowledged
    SubscribeOk,
    /// Trading session needs no subscription phase
    NoSubscriptions,
    /// Transport lost or heartbeat timed out
    ConnectionLost,
    /// Explicit shutdown
    Close,
}

/// The session FSM
#[derive(Debug, Clone)]
pub struct SessionFsm {
    state: SessionState,
}

impl SessionFsm {
    pub fn new() -> Self {
        Self { state: SessionState::Disconnected }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Consume an event and transition.
    /// Returns the previous state on success, Err on an invalid transition.
    pub fn consume(&mut self, event: SessionEvent) -> Result<SessionState, String> {
        use SessionEvent::*;
        use SessionState::*;

        let prev = self.state;
        let next = match (prev, event) {
            (Closed, _) => {
                return Err(format!("cannot transition from terminal Closed with {:?}", event))
            }

            // Shutdown and connection loss win from any live state
            (_, Close) => Closed,
            (_, ConnectionLost) => Disconnected,

            (Disconnected, StartConnect) => Connecting,
            (Connecting, TransportUp) => LoggingIn,
            (LoggingIn, LoginOk) => Authenticated,
            (LoggingIn, AuthFailed) => Disconnected,
            (Authenticated, SubscribeIssued) => Subscribing,
            (Authenticated, NoSubscriptions) => Ready,
            (Subscribing, SubscribeOk) => Ready,
            // Later subscriptions from Ready stay Ready
            (Ready, SubscribeIssued) => Ready,
            (Ready, SubscribeOk) => Ready,

            _ => return Err(format!("invalid transition from {:?} with {:?}", prev, event)),
        };

        self.state = next;
        Ok(prev)
    }
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionFsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_market_data() {
        let mut fsm = SessionFsm::new();
        fsm.consume(SessionEvent::StartConnect).unwrap();
        fsm.consume(SessionEvent::TransportUp).unwrap();
        fsm.consume(SessionEvent::LoginOk).unwrap();
        fsm.consume(SessionEvent::SubscribeIssued).unwrap();
        fsm.consume(SessionEvent::SubscribeOk).unwrap();
        assert_eq!(fsm.state(), SessionState::Ready);
    }

    #[test]
    fn test_happy_path_trading() {
        let mut fsm = SessionFsm::new();
        fsm.consume(SessionEvent::StartConnect).unwrap();
        fsm.consume(SessionEvent::TransportUp).unwrap();
        fsm.consume(SessionEvent::LoginOk).unwrap();
        fsm.consume(SessionEvent::NoSubscriptions).unwrap();
        assert_eq!(fsm.state(), SessionState::Ready);
    }

    #[test]
    fn test_loss_from_any_state() {
        for setup in [
            vec![SessionEvent::StartConnect],
            vec![SessionEvent::StartConnect, SessionEvent::TransportUp],
            vec![
                SessionEvent::StartConnect,
                SessionEvent::TransportUp,
                SessionEvent::LoginOk,
            ],
        ] {
            let mut fsm = SessionFsm::new();
            for ev in setup {
                fsm.consume(ev).unwrap();
            }
            fsm.consume(SessionEvent::ConnectionLost).unwrap();
            assert_eq!(fsm.state(), SessionState::Disconnected);
        }
    }

    #[test]
    fn test_auth_failure_returns_to_disconnected() {
        let mut fsm = SessionFsm::new();
        fsm.consume(SessionEvent::StartConnect).unwrap();
        fsm.consume(SessionEvent::TransportUp).unwrap();
        let prev = fsm.consume(SessionEvent::AuthFailed).unwrap();
        assert_eq!(prev, SessionState::LoggingIn);
        assert_eq!(fsm.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut fsm = SessionFsm::new();
        fsm.consume(SessionEvent::Close).unwrap();
        assert!(fsm.is_terminal());
        assert!(fsm.consume(SessionEvent::StartConnect).is_err());
        assert!(fsm.consume(SessionEvent::ConnectionLost).is_err());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut fsm = SessionFsm::new();
        assert!(fsm.consume(SessionEvent::LoginOk).is_err());
        assert!(fsm.consume(SessionEvent::TransportUp).is_err());
        assert_eq!(fsm.state(), SessionState::Disconnected);
    }
}
