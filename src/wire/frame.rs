//! Frame header parse/build
//!
//! The frame header rides inside the record envelope; the record layer
//! already guarantees length and CRC integrity by the time a frame is
//! decoded here.

use std::fmt;

use crate::record::{record_decode, record_encode, RecordError};

/// Frame header size inside the envelope: kind(1) + request_id(8)
const FRAME_HEADER_SIZE: usize = 9;

/// Frame kind with explicit wire values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Heartbeat = 0,
    Request = 1,
    Response = 128,
    Push = 129,
}

impl TryFrom<u8> for FrameKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameKind::Heartbeat),
            1 => Ok(FrameKind::Request),
            128 => Ok(FrameKind::Response),
            129 => Ok(FrameKind::Push),
            other => Err(other),
        }
    }
}

/// One decoded wire frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub request_id: u64,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn heartbeat() -> Self {
        Self { kind: FrameKind::Heartbeat, request_id: 0, body: Vec::new() }
    }

    pub fn request(request_id: u64, body: Vec<u8>) -> Self {
        Self { kind: FrameKind::Request, request_id, body }
    }

    pub fn response(request_id: u64, body: Vec<u8>) -> Self {
        Self { kind: FrameKind::Response, request_id, body }
    }

    pub fn push(body: Vec<u8>) -> Self {
        Self { kind: FrameKind::Push, request_id: 0, body }
    }

    /// Encode to the on-wire byte form (record envelope included)
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(FRAME_HEADER_SIZE + self.body.len());
        data.push(self.kind as u8);
        data.extend_from_slice(&self.request_id.to_be_bytes());
        data.extend_from_slice(&self.body);
        record_encode(&data)
    }

    /// Decode one frame from a full record-envelope buffer
    pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
        let (data, _consumed) = record_decode(buf)?;
        Self::decode_inner(data)
    }

    /// Decode the frame header + body from already-unwrapped record data
    pub fn decode_inner(data: &[u8]) -> Result<Frame, FrameError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::Truncated);
        }
        let kind = FrameKind::try_from(data[0]).map_err(FrameError::UnknownKind)?;
        let request_id = u64::from_be_bytes(data[1..9].try_into().unwrap());
        Ok(Frame { kind, request_id, body: data[FRAME_HEADER_SIZE..].to_vec() })
    }
}

/// Frame decode errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    Record(RecordError),
    Truncated,
    UnknownKind(u8),
    BadBody(String),
}

impl From<RecordError> for FrameError {
    fn from(err: RecordError) -> Self {
        FrameError::Record(err)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Record(e) => write!(f, "record layer: {}", e),
            FrameError::Truncated => write!(f, "frame shorter than header"),
            FrameError::UnknownKind(k) => write!(f, "unknown frame kind: {}", k),
            FrameError::BadBody(msg) => write!(f, "undecodable frame body: {}", msg),
        }
    }
}

impl std::error::Error for FrameError {}
