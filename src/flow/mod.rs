//! Flow log store
//!
//! Durable local record of session traffic: every substantive frame sent or
//! received is appended (sequence number, direction, raw frame bytes) before
//! the send/receive is considered complete. Replaying the log at startup
//! restores dispatcher bookkeeping so the session resumes with gap recovery
//! instead of a full historical replay.

pub mod entry;
pub mod replay;
pub mod store;

pub use entry::{Direction, FlowError, FlowRecord};
pub use replay::{FlowReplay, ReplayStats};
pub use store::FlowLogStore;
