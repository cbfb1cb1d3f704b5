//! Error taxonomy for bus operations.
//!
//! Every failure here is fatal to the operation that hit it; there is no
//! retry policy anywhere in the crate. Undecodable log contents are not an
//! error (see `store`): the log reads as empty instead.

use std::io;
use std::path::PathBuf;

use crate::codec::CodecError;
use crate::config::ConfigError;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The wakeup directory or a subscriber FIFO could not be created.
    #[error("failed to initialize wakeup channel at {}: {source}", path.display())]
    Init { path: PathBuf, source: io::Error },

    /// A shared or exclusive lock on the event log could not be acquired
    /// or released.
    #[error("failed to lock event log at {}: {source}", path.display())]
    Lock { path: PathBuf, source: io::Error },

    /// Reading or writing the event log or a wakeup pipe failed.
    #[error("I/O failure at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// Encoding the event sequence for persistence failed.
    #[error("failed to encode event log: {0}")]
    Encode(#[from] CodecError),

    /// A publish or subscribe was attempted with no channels at all.
    #[error("channel set is empty")]
    EmptyChannels,

    /// `run_as_worker` was called on a request-scoped bus instance.
    #[error("worker roles cannot start in a request-scoped bus")]
    RequestContext,

    /// A worker role thread could not be spawned.
    #[error("failed to spawn worker role: {0}")]
    Thread(io::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
