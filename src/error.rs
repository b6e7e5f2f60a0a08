//! Client error taxonomy
//!
//! Classification drives retry policy:
//! - `Connection` is transient and retried with backoff by the session
//! - `Authentication` is fatal to the session and never retried automatically
//! - `Timeout` / `GatewayRejected` are per-request; retry is the caller's call
//! - `Cancelled` is caller- or shutdown-initiated
//! - `Storage` is only fatal at startup; mid-session the store degrades instead

use std::fmt;

/// Errors surfaced by the client facade and request handles
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Transport-level failure (connect refused, socket died, bad address)
    Connection(String),
    /// Gateway rejected the login or authenticate handshake
    Authentication(String),
    /// No response before the request deadline
    Timeout,
    /// Business-level rejection reported by the gateway, surfaced verbatim
    GatewayRejected { code: i32, message: String },
    /// Request cancelled by the caller or by session shutdown
    Cancelled,
    /// Flow log store could not be opened or replayed at startup
    Storage(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connection(msg) => write!(f, "connection error: {}", msg),
            ClientError::Authentication(msg) => write!(f, "authentication failed: {}", msg),
            ClientError::Timeout => write!(f, "request timed out"),
            ClientError::GatewayRejected { code, message } => {
                write!(f, "gateway rejected: code={} {}", code, message)
            }
            ClientError::Cancelled => write!(f, "request cancelled"),
            ClientError::Storage(msg) => write!(f, "flow store error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_classification() {
        let err = ClientError::GatewayRejected { code: 42, message: "bad order".into() };
        assert_eq!(format!("{}", err), "gateway rejected: code=42 bad order");
        assert_eq!(format!("{}", ClientError::Timeout), "request timed out");
    }

    #[test]
    fn test_eq() {
        assert_eq!(ClientError::Cancelled, ClientError::Cancelled);
        assert_ne!(ClientError::Timeout, ClientError::Cancelled);
    }
}
