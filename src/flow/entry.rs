//! Flow record format
//!
//! Record envelope data: [direction: u8][seq: u64 BE][frame bytes]
//!
//! The frame bytes are the full on-wire record for the frame, so a replayed
//! record can be decoded with the same path as live traffic.

use std::fmt;

use crate::record::{record_decode, record_encode, RecordError};

/// Direction of the logged frame relative to this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Outbound = 0,
    Inbound = 1,
}

impl TryFrom<u8> for Direction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Outbound),
            1 => Ok(Direction::Inbound),
            other => Err(other),
        }
    }
}

/// One durable flow record
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub seq: u64,
    pub direction: Direction,
    pub frame: Vec<u8>,
}

impl FlowRecord {
    pub fn new(seq: u64, direction: Direction, frame: Vec<u8>) -> Self {
        Self { seq, direction, frame }
    }

    /// Serialize to the on-disk byte form (record envelope included)
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(9 + self.frame.len());
        data.push(self.direction as u8);
        data.extend_from_slice(&self.seq.to_be_bytes());
        data.extend_from_slice(&self.frame);
        record_encode(&data)
    }

    /// Deserialize one record from the head of `buf`, returning it and the
    /// number of bytes consumed
    pub fn deserialize(buf: &[u8]) -> Result<(Self, usize), FlowError> {
        let (data, consumed) = record_decode(buf)?;

        if data.len() < 9 {
            return Err(FlowError::Truncated);
        }
        let direction =
            Direction::try_from(data[0]).map_err(FlowError::InvalidDirection)?;
        let seq = u64::from_be_bytes(data[1..9].try_into().unwrap());

        Ok((Self { seq, direction, frame: data[9..].to_vec() }, consumed))
    }
}

/// Flow store errors
#[derive(Debug, Clone, PartialEq)]
pub enum FlowError {
    Truncated,
    InvalidDirection(u8),
    Record(RecordError),
    /// Sequence did not advance past the previous append
    NonMonotonicSeq { last: u64, attempted: u64 },
    /// Another process holds the flow directory
    Locked(String),
    Io(String),
}

impl From<RecordError> for FlowError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Truncated => FlowError::Truncated,
            other => FlowError::Record(other),
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::Truncated => write!(f, "data too short for flow record"),
            FlowError::InvalidDirection(d) => write!(f, "invalid direction byte: {}", d),
            FlowError::Record(e) => write!(f, "record layer: {}", e),
            FlowError::NonMonotonicSeq { last, attempted } => {
                write!(f, "sequence must increase: last={}, attempted={}", last, attempted)
            }
            FlowError::Locked(msg) => write!(f, "flow directory locked: {}", msg),
            FlowError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for FlowError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let rec = FlowRecord::new(9, Direction::Inbound, vec![1, 2, 3, 4]);
        let bytes = rec.serialize();
        let (parsed, consumed) = FlowRecord::deserialize(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, rec);
    }

    #[test]
    fn test_direction_byte() {
        assert_eq!(Direction::try_from(0).unwrap(), Direction::Outbound);
        assert_eq!(Direction::try_from(1).unwrap(), Direction::Inbound);
        assert!(Direction::try_from(2).is_err());
    }

    #[test]
    fn test_corrupt_record() {
        let mut bytes = FlowRecord::new(1, Direction::Outbound, vec![5; 8]).serialize();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            FlowRecord::deserialize(&bytes),
            Err(FlowError::Record(RecordError::CrcMismatch { .. }))
        ));
    }
}
