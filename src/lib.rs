//! fifobus — single-host publish/subscribe for processes that share a
//! filesystem but not memory.
//!
//! Publishers append timestamped, channel-tagged events to a lock-guarded
//! shared log file; subscribers replay the matching backlog and then block
//! on a private named pipe until the next publish. There is no broker
//! process and no network transport: the log file and the wakeup pipes are
//! the whole coordination surface.

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod store;
pub mod wakeup;
pub mod worker;

pub use bus::{Bus, SubscribeOptions};
pub use codec::{BincodeCodec, CodecError, LogCodec};
pub use config::{BusConfig, ConfigError};
pub use error::{BusError, Result};
pub use event::{unix_now, ChannelSet, Event, ALL_CHANNELS};
pub use store::EventLog;
pub use wakeup::{WakeupChannel, WakeupSlot};
pub use worker::HEARTBEAT_CHANNEL;
