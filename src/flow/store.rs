//! Append-only flow log with process-exclusive ownership
//!
//! One directory per client instance. `LOCK` holds the owning PID and makes
//! a second instance pointed at the same directory fail fast instead of
//! interleaving appends. Appends are synchronous and fsync'd: the caller
//! must not consider the corresponding send/receive complete until append
//! returns.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::entry::{Direction, FlowError, FlowRecord};
use super::replay::FlowReplay;

const FLOW_FILE: &str = "session.flow";
const LOCK_FILE: &str = "LOCK";

pub struct FlowLogStore {
    dir: PathBuf,
    file: File,
    last_seq: u64,
}

impl FlowLogStore {
    /// Open (creating if needed) the flow log under `dir`
    ///
    /// Creates the directory with parents, takes the directory lock, and
    /// positions after the last durable record. Fails if another live
    /// process holds the lock.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, FlowError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| FlowError::Io(e.to_string()))?;

        Self::take_lock(&dir)?;

        let path = dir.join(FLOW_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| FlowError::Io(e.to_string()))?;

        // Seed last_seq from the existing tail
        let last_seq = match FlowReplay::open(&path) {
            Ok(replay) => replay.filter_map(|r| r.ok()).map(|r| r.seq).last().unwrap_or(0),
            Err(_) => 0,
        };

        log::info!("[FLOW] Opened {} (last_seq={})", path.display(), last_seq);

        Ok(Self { dir, file, last_seq })
    }

    fn take_lock(dir: &Path) -> Result<(), FlowError> {
        let lock_path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&lock_path).unwrap_or_default();
                Err(FlowError::Locked(format!(
                    "{} held by pid {}",
                    lock_path.display(),
                    holder.trim()
                )))
            }
            Err(e) => Err(FlowError::Io(e.to_string())),
        }
    }

    /// Durably append one record
    ///
    /// Sequence numbers must strictly increase within the session.
    pub fn append(&mut self, seq: u64, direction: Direction, frame: &[u8]) -> Result<(), FlowError> {
        if seq <= self.last_seq {
            return Err(FlowError::NonMonotonicSeq { last: self.last_seq, attempted: seq });
        }

        let record = FlowRecord::new(seq, direction, frame.to_vec());
        let bytes = record.serialize();

        self.file.write_all(&bytes).map_err(|e| FlowError::Io(e.to_string()))?;
        self.file.sync_data().map_err(|e| FlowError::Io(e.to_string()))?;

        self.last_seq = seq;
        Ok(())
    }

    /// Highest durably recorded sequence number (0 if none)
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Open a fresh replay pass over this store's records
    pub fn replay(&self) -> Result<FlowReplay, FlowError> {
        FlowReplay::open(self.dir.join(FLOW_FILE))
    }

    /// Flush any OS buffering; called on shutdown
    pub fn flush(&mut self) -> Result<(), FlowError> {
        self.file.sync_all().map_err(|e| FlowError::Io(e.to_string()))
    }
}

impl Drop for FlowLogStore {
    fn drop(&mut self) {
        let _ = self.file.sync_all();
        let _ = fs::remove_file(self.dir.join(LOCK_FILE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_reopen() {
        let dir = tempdir().unwrap();

        {
            let mut store = FlowLogStore::open(dir.path()).unwrap();
            store.append(1, Direction::Outbound, b"frame-a").unwrap();
            store.append(2, Direction::Inbound, b"frame-b").unwrap();
            assert_eq!(store.last_seq(), 2);
        }

        // Lock released on drop; reopen resumes the sequence
        let store = FlowLogStore::open(dir.path()).unwrap();
        assert_eq!(store.last_seq(), 2);
    }

    #[test]
    fn test_second_holder_fails_fast() {
        let dir = tempdir().unwrap();
        let _store = FlowLogStore::open(dir.path()).unwrap();

        match FlowLogStore::open(dir.path()) {
            Err(FlowError::Locked(_)) => {}
            other => panic!("expected Locked, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_sequence_must_increase() {
        let dir = tempdir().unwrap();
        let mut store = FlowLogStore::open(dir.path()).unwrap();

        store.append(5, Direction::Outbound, b"x").unwrap();
        assert!(matches!(
            store.append(5, Direction::Outbound, b"y"),
            Err(FlowError::NonMonotonicSeq { last: 5, attempted: 5 })
        ));
        assert!(matches!(
            store.append(3, Direction::Inbound, b"z"),
            Err(FlowError::NonMonotonicSeq { .. })
        ));
        // Store still usable after a rejected append
        store.append(6, Direction::Inbound, b"ok").unwrap();
    }

    #[test]
    fn test_creates_missing_parents() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("flow");
        let store = FlowLogStore::open(&nested).unwrap();
        assert_eq!(store.last_seq(), 0);
        assert!(nested.join(LOCK_FILE).exists());
    }
}
