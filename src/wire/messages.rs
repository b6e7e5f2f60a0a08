//! Request, response and push bodies
//!
//! Bodies are bincode on the wire. Gateway-reported failures travel as
//! `ResponseBody::Error`; the session classifies them (authentication vs
//! business rejection) by the kind of the pending request they answer.

use serde::{Deserialize, Serialize};

use crate::models::{
    AccountSnapshot, AuthInfo, Credentials, OrderInput, OrderUpdate, Position, QuoteTick,
};

/// Private-flow resume mode sent with login
///
/// Controls which backlog of private pushes the gateway resends after the
/// session comes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeMode {
    /// Resend the full historical flow for the trading day
    Restart,
    /// Resend everything after the sequence number carried in the login
    Resume,
    /// Live pushes only
    Quick,
}

/// Login request body
///
/// `last_seq` is the highest sequence number the client has durably
/// recorded; with `ResumeMode::Resume` the gateway resends only messages
/// after that point (gap recovery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub credentials: Credentials,
    pub last_seq: u64,
    pub resume: ResumeMode,
}

/// Login acknowledgement body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAck {
    pub trading_day: String,
    pub session_id: u64,
}

/// Gateway-reported failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: i32,
    pub message: String,
}

/// Error codes the gateway uses for handshake rejections
pub mod error_codes {
    /// Bad credentials or rejected authenticate
    pub const AUTH_REJECTED: i32 = 3;
}

/// Correlated request bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    Authenticate(AuthInfo),
    Login(LoginRequest),
    Logout,
    OrderInsert(OrderInput),
    OrderCancel { order_id: u64 },
    QueryPositions,
    QueryAccount,
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
}

impl RequestBody {
    /// True for the handshake requests whose rejection is fatal to the
    /// session rather than a per-request business error
    pub fn is_auth(&self) -> bool {
        matches!(self, RequestBody::Authenticate(_) | RequestBody::Login(_))
    }
}

/// Correlated response bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseBody {
    AuthenticateAck,
    LoginAck(LoginAck),
    LogoutAck,
    OrderAccepted { order_id: u64 },
    CancelAck { order_id: u64 },
    Positions(Vec<Position>),
    Account(AccountSnapshot),
    Subscribed(Vec<String>),
    Unsubscribed(Vec<String>),
    Error(GatewayError),
}

/// Unsolicited push bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushBody {
    Quote(QuoteTick),
    OrderUpdate(OrderUpdate),
}

pub fn encode_body<T: Serialize>(body: &T) -> Vec<u8> {
    bincode::serialize(body).expect("wire body serialization cannot fail")
}

pub fn decode_body<'a, T: Deserialize<'a>>(buf: &'a [u8]) -> Result<T, String> {
    bincode::deserialize(buf).map_err(|e| e.to_string())
}
