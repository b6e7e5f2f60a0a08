//! Flow log replay
//!
//! Lazy forward scan over a flow file in insertion order. Used once at
//! startup to rebuild dispatcher bookkeeping before the live connection
//! resumes; restartable by opening a fresh pass.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::entry::{FlowError, FlowRecord};
use crate::record::RECORD_HEADER_SIZE;

/// Iterator over flow records
///
/// Yields `Err` once for a corrupt tail, then stops; zero padding after the
/// last record terminates the scan cleanly.
pub struct FlowReplay {
    reader: BufReader<File>,
    buffer: Vec<u8>,
    offset: usize,
    filled: usize,
    finished: bool,
    stats: ReplayStats,
}

/// Counters from one replay pass
#[derive(Debug, Clone, Default)]
pub struct ReplayStats {
    pub records_read: u64,
    pub bytes_read: u64,
}

impl FlowReplay {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FlowError> {
        let file = File::open(path).map_err(|e| FlowError::Io(e.to_string()))?;
        Ok(Self {
            reader: BufReader::new(file),
            buffer: Vec::with_capacity(64 * 1024),
            offset: 0,
            filled: 0,
            finished: false,
            stats: ReplayStats::default(),
        })
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// Ensure at least `need` unconsumed bytes are buffered, compacting the
    /// consumed prefix first. Returns the number available (may be < need
    /// at EOF).
    fn fill(&mut self, need: usize) -> Result<usize, FlowError> {
        if self.offset > 0 {
            self.buffer.drain(..self.offset);
            self.filled -= self.offset;
            self.offset = 0;
        }

        let mut chunk = [0u8; 16 * 1024];
        while self.filled < need {
            let n = self.reader.read(&mut chunk).map_err(|e| FlowError::Io(e.to_string()))?;
            if n == 0 {
                break;
            }
            self.buffer.extend_from_slice(&chunk[..n]);
            self.filled += n;
        }
        Ok(self.filled)
    }
}

impl Iterator for FlowReplay {
    type Item = Result<FlowRecord, FlowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        // Header first, to learn the record length
        let avail = match self.fill(RECORD_HEADER_SIZE) {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };

        if avail == 0 {
            self.finished = true;
            return None;
        }

        if avail < RECORD_HEADER_SIZE {
            self.finished = true;
            // Trailing zeros are clean termination, anything else is a torn tail
            if self.buffer[..avail].iter().all(|&b| b == 0) {
                return None;
            }
            return Some(Err(FlowError::Truncated));
        }

        if self.buffer[..RECORD_HEADER_SIZE].iter().all(|&b| b == 0) {
            self.finished = true;
            return None;
        }

        // Peek length, then buffer the whole record
        let header: [u8; RECORD_HEADER_SIZE] =
            self.buffer[..RECORD_HEADER_SIZE].try_into().unwrap();
        let body_len = match crate::record::record_body_len(&header) {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Some(Err(e.into()));
            }
        };

        let total = RECORD_HEADER_SIZE + body_len;
        match self.fill(total) {
            Ok(n) if n >= total => {}
            Ok(_) => {
                self.finished = true;
                return Some(Err(FlowError::Truncated));
            }
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        }

        match FlowRecord::deserialize(&self.buffer[..total]) {
            Ok((record, consumed)) => {
                self.offset = consumed;
                self.stats.records_read += 1;
                self.stats.bytes_read += consumed as u64;
                Some(Ok(record))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::entry::Direction;
    use crate::flow::store::FlowLogStore;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_replay_empty() {
        let dir = tempdir().unwrap();
        let store = FlowLogStore::open(dir.path()).unwrap();
        let records: Vec<_> = store.replay().unwrap().collect();
        assert!(records.is_empty());
    }

    #[test]
    fn test_replay_in_insertion_order() {
        let dir = tempdir().unwrap();
        let mut store = FlowLogStore::open(dir.path()).unwrap();

        for seq in 1..=20u64 {
            let dir_flag = if seq % 2 == 0 { Direction::Inbound } else { Direction::Outbound };
            store.append(seq, dir_flag, &[seq as u8; 32]).unwrap();
        }

        let records: Vec<FlowRecord> =
            store.replay().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 20);
        for (i, rec) in records.iter().enumerate() {
            assert_eq!(rec.seq, i as u64 + 1);
            assert_eq!(rec.frame, vec![rec.seq as u8; 32]);
        }
    }

    #[test]
    fn test_replay_is_restartable() {
        let dir = tempdir().unwrap();
        let mut store = FlowLogStore::open(dir.path()).unwrap();
        store.append(1, Direction::Outbound, b"one").unwrap();
        store.append(2, Direction::Inbound, b"two").unwrap();

        let first: Vec<_> = store.replay().unwrap().collect::<Result<_, _>>().unwrap();
        let second: Vec<_> = store.replay().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_torn_tail_reported_once() {
        let dir = tempdir().unwrap();
        {
            let mut store = FlowLogStore::open(dir.path()).unwrap();
            store.append(1, Direction::Outbound, b"whole").unwrap();
        }

        // Simulate a torn write: append half a record by hand
        let path = dir.path().join("session.flow");
        let full = FlowRecord::new(2, Direction::Outbound, vec![7; 64]).serialize();
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&full[..full.len() / 2]).unwrap();
        drop(f);

        let mut replay = FlowReplay::open(&path).unwrap();
        assert!(replay.next().unwrap().is_ok());
        assert!(replay.next().unwrap().is_err());
        assert!(replay.next().is_none());
    }
}
