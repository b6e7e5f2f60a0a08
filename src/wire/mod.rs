//! Wire protocol for the front gateway link
//!
//! Every unit on the socket is one record-layer envelope whose data is:
//!
//!   [kind: u8][request_id: u64 BE][body]
//!
//! - `Heartbeat` carries request_id 0 and an empty body
//! - `Request`/`Response` correlate through request_id
//! - `Push` carries request_id 0; the body names the event
//!
//! Bodies are bincode-encoded serde enums defined in `messages`.

pub mod frame;
pub mod messages;

pub use frame::{Frame, FrameError, FrameKind};
pub use messages::{
    GatewayError, LoginAck, LoginRequest, PushBody, RequestBody, ResponseBody, ResumeMode,
};
