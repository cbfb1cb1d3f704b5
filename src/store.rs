//! The shared event log.
//!
//! A single file holds the encoded event sequence, newest first. Whole-file
//! advisory locks are the only consistency mechanism: readers take a shared
//! lock, the read-modify-write of an append takes an exclusive lock. The OS
//! releases either lock when the holding process dies, so a crash mid-append
//! never wedges the bus.
//!
//! Undecodable contents read as an empty sequence. That trades a silent data
//! loss for availability; callers never see a decode error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tracing::{debug, warn};

use crate::codec::LogCodec;
use crate::error::{BusError, Result};
use crate::event::Event;

/// File-backed, lock-guarded event log.
pub struct EventLog {
    path: PathBuf,
    backlog_seconds: f64,
    codec: Arc<dyn LogCodec>,
}

impl EventLog {
    /// Create a handle. The backing file is created lazily on first use and
    /// never deleted by this subsystem.
    pub fn open(path: impl Into<PathBuf>, backlog_seconds: f64, codec: Arc<dyn LogCodec>) -> Self {
        Self {
            path: path.into(),
            backlog_seconds,
            codec,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full stored sequence under a shared lock.
    ///
    /// Returns events newest first. A missing, empty, or undecodable file
    /// reads as an empty sequence.
    pub fn read_snapshot(&self) -> Result<Vec<Event>> {
        let mut file = self.open_file()?;
        self.lock(&file, false)?;

        let mut bytes = Vec::new();
        let read = file.read_to_end(&mut bytes);
        let unlocked = file.unlock();

        read.map_err(|e| self.io_error(e))?;
        unlocked.map_err(|e| self.lock_error(e))?;

        Ok(self.decode_or_empty(&bytes))
    }

    /// Append `event` at the front and drop everything older than the
    /// backlog window, all under one exclusive lock.
    ///
    /// Trimming is evaluated against `now` (the publish time), not against
    /// wall-clock at some later read. The event is stamped with `now` under
    /// the lock; a reading that lost the lock race to a later one is nudged
    /// just past the current front, so append order and timestamp order
    /// always agree.
    pub fn append_and_trim(&self, event: Event, now: f64) -> Result<()> {
        let mut file = self.open_file()?;
        self.lock(&file, true)?;

        let rewritten = self.rewrite(&mut file, event, now);
        let unlocked = file.unlock();

        rewritten?;
        unlocked.map_err(|e| self.lock_error(e))?;

        Ok(())
    }

    fn rewrite(&self, file: &mut File, mut event: Event, mut now: f64) -> Result<()> {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| self.io_error(e))?;

        let mut events = self.decode_or_empty(&bytes);
        // Lock-grant order defines publish order. A clock reading taken
        // before a slower lock acquisition can land behind the current
        // front; nudge it past so the sequence stays strictly
        // time-descending.
        if let Some(front) = events.first() {
            if now <= front.timestamp {
                now = just_after(front.timestamp);
            }
        }
        event.timestamp = now;

        let before = events.len();
        events.retain(|e| now - e.timestamp <= self.backlog_seconds);
        // New events are always the newest, so the front keeps the sequence
        // sorted descending by timestamp.
        events.insert(0, event);

        let encoded = self.codec.encode(&events)?;
        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_error(e))?;
        file.set_len(0).map_err(|e| self.io_error(e))?;
        file.write_all(&encoded).map_err(|e| self.io_error(e))?;

        debug!(
            path = %self.path.display(),
            retained = events.len(),
            trimmed = before + 1 - events.len(),
            "appended event"
        );

        Ok(())
    }

    fn open_file(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))
    }

    /// Lock acquisition failure is fatal to the operation: no retry, no
    /// backoff.
    fn lock(&self, file: &File, exclusive: bool) -> Result<()> {
        let acquired = if exclusive {
            file.lock_exclusive()
        } else {
            file.lock_shared()
        };
        acquired.map_err(|e| self.lock_error(e))
    }

    fn decode_or_empty(&self, bytes: &[u8]) -> Vec<Event> {
        if bytes.is_empty() {
            return Vec::new();
        }
        match self.codec.decode(bytes) {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "event log undecodable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn io_error(&self, source: std::io::Error) -> BusError {
        BusError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn lock_error(&self, source: std::io::Error) -> BusError {
        BusError::Lock {
            path: self.path.clone(),
            source,
        }
    }
}

/// Smallest representable timestamp strictly greater than `t`.
fn just_after(t: f64) -> f64 {
    let bumped = t * (1.0 + f64::EPSILON);
    if bumped > t {
        bumped
    } else {
        t + f64::MIN_POSITIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BincodeCodec;
    use crate::event::ChannelSet;
    use tempfile::TempDir;

    fn test_log(dir: &TempDir, backlog_seconds: f64) -> EventLog {
        EventLog::open(
            dir.path().join("events.bin"),
            backlog_seconds,
            Arc::new(BincodeCodec),
        )
    }

    fn event(name: &str, timestamp: f64) -> Event {
        Event::new(ChannelSet::from(name), name.as_bytes().to_vec(), timestamp)
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir, 60.0);
        assert!(log.read_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_append_keeps_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir, 60.0);

        log.append_and_trim(event("first", 10.0), 10.0).unwrap();
        log.append_and_trim(event("second", 11.0), 11.0).unwrap();

        let events = log.read_snapshot().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, b"second");
        assert_eq!(events[1].payload, b"first");
    }

    #[test]
    fn test_trim_is_relative_to_publish_time() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir, 1.0);

        log.append_and_trim(event("old", 8.5), 8.5).unwrap();
        log.append_and_trim(event("edge", 9.0), 9.0).unwrap();
        log.append_and_trim(event("new", 10.0), 10.0).unwrap();

        let events = log.read_snapshot().unwrap();
        // "edge" sits exactly at the window boundary and survives; "old" is
        // strictly past it and is gone.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, b"new");
        assert_eq!(events[1].payload, b"edge");
    }

    #[test]
    fn test_stale_clock_append_keeps_descending_order() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir, 60.0);

        log.append_and_trim(event("fast", 10.0), 10.0).unwrap();
        // A publisher that read its clock first but acquired the lock
        // second: its stamp must still land ahead of the front.
        log.append_and_trim(event("slow", 9.0), 9.0).unwrap();

        let events = log.read_snapshot().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, b"slow");
        assert_eq!(events[1].payload, b"fast");
        assert!(events[0].timestamp > events[1].timestamp);
        assert_eq!(events[1].timestamp, 10.0);
    }

    #[test]
    fn test_just_after_is_strictly_greater() {
        for t in [0.0, 10.0, 1.7e9] {
            assert!(just_after(t) > t);
        }
    }

    #[test]
    fn test_garbage_file_reads_empty_and_recovers_on_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.bin");
        std::fs::write(&path, b"\xff\xfe not an event log").unwrap();

        let log = EventLog::open(&path, 60.0, Arc::new(BincodeCodec));
        assert!(log.read_snapshot().unwrap().is_empty());

        // An append rewrites the file with a clean sequence.
        log.append_and_trim(event("fresh", 5.0), 5.0).unwrap();
        let events = log.read_snapshot().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, b"fresh");
    }
}
