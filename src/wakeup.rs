//! Wakeup channel: per-subscriber named pipes under one directory.
//!
//! A single shared FIFO cannot broadcast: one byte wakes one reader. Each
//! subscriber therefore owns a private FIFO inside the wakeup directory and
//! blocks on that alone, while `signal` fans one byte out to every FIFO it
//! finds there. A pipe without a reader belongs to a subscriber that died
//! without cleanup; `signal` unlinks it so the directory does not
//! accumulate orphans. Waits are bounded by a poll timeout so a subscriber
//! can notice lost liveness even when nothing is ever published again.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::libc;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, warn};

use crate::error::{BusError, Result};

const FIFO_EXTENSION: &str = "fifo";
/// New slots are created under this extension, invisible to `signal`, and
/// renamed only once their read end is open. Without the staging step a
/// publisher could hit ENXIO on a healthy slot mid-registration and unlink
/// it.
const STAGING_EXTENSION: &str = "staging";

/// Distinguishes slots created by one process within the same wakeup dir.
static SLOT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Publisher-side handle to the wakeup directory.
pub struct WakeupChannel {
    dir: PathBuf,
}

impl WakeupChannel {
    /// Create the wakeup directory if absent. Failure here is fatal and
    /// prevents the bus from starting.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BusError::Init {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Best-effort fan-out: write one byte to every subscriber FIFO.
    ///
    /// A full pipe means that subscriber already has a pending wakeup; a
    /// pipe with no reader belongs to a subscriber that is gone and gets
    /// unlinked. Neither is an error.
    pub fn signal(&self) -> Result<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| BusError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "unreadable wakeup entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FIFO_EXTENSION) {
                continue;
            }

            match OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&path)
            {
                Ok(mut fifo) => match fifo.write(&[1u8]) {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        // Pipe full: a wakeup is already pending there.
                    }
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                    Err(e) => {
                        warn!(pipe = %path.display(), error = %e, "failed to write wakeup byte");
                    }
                },
                Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                    // No reader. Live slots hold their read end open for
                    // their whole lifetime, so this subscriber died without
                    // cleanup.
                    if fs::remove_file(&path).is_ok() {
                        debug!(pipe = %path.display(), "unlinked orphaned wakeup pipe");
                    }
                }
                Err(e) => {
                    warn!(pipe = %path.display(), error = %e, "failed to open wakeup pipe");
                }
            }
        }

        Ok(())
    }

    /// Register a private FIFO for one subscriber loop.
    pub fn subscriber_slot(&self) -> Result<WakeupSlot> {
        let stem = format!("sub-{}-{}", process::id(), SLOT_SEQ.fetch_add(1, Ordering::Relaxed));
        let staged = self.dir.join(format!("{stem}.{STAGING_EXTENSION}"));
        let path = self.dir.join(format!("{stem}.{FIFO_EXTENSION}"));

        // 0666: any local publisher process may signal this slot.
        mkfifo(&staged, Mode::from_bits_truncate(0o666)).map_err(|e| BusError::Init {
            path: staged.clone(),
            source: io::Error::other(e),
        })?;

        // Read+write keeps our own writer open, so reads never hit EOF when
        // publishers close their ends between signals.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&staged)
            .map_err(|e| BusError::Init {
                path: staged.clone(),
                source: e,
            })?;

        // The reader exists now; publish the slot under its final name.
        fs::rename(&staged, &path).map_err(|e| BusError::Init {
            path: path.clone(),
            source: e,
        })?;

        debug!(pipe = %path.display(), "wakeup slot registered");

        Ok(WakeupSlot { path, file })
    }
}

/// Subscriber-side handle to one private FIFO.
///
/// The FIFO is removed when the slot is dropped.
pub struct WakeupSlot {
    path: PathBuf,
    file: File,
}

impl WakeupSlot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until a signal arrives or `timeout` elapses.
    ///
    /// Returns `true` when a signal was consumed, `false` on timeout. All
    /// pending bytes are drained so coalesced signals wake exactly once.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let poll_timeout = PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX);

        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        let ready = match poll(&mut fds, poll_timeout) {
            Ok(n) => n,
            // Interrupted by a signal: report a timeout and let the caller's
            // cycle re-check liveness.
            Err(Errno::EINTR) => return Ok(false),
            Err(e) => {
                return Err(BusError::Io {
                    path: self.path.clone(),
                    source: io::Error::other(e),
                })
            }
        };

        if ready == 0 {
            return Ok(false);
        }

        self.drain()?;
        Ok(true)
    }

    fn drain(&self) -> Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match (&self.file).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    return Err(BusError::Io {
                        path: self.path.clone(),
                        source: e,
                    })
                }
            }
        }
        Ok(())
    }
}

impl Drop for WakeupSlot {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
