//! Bus facade: publish and the blocking subscriber loop.
//!
//! Publishing appends to the shared log and fans a wakeup out to every
//! subscriber pipe. Subscribing replays the matching backlog, dispatches to
//! a callback, then blocks on a private wakeup pipe until the next publish
//! (or the poll timeout, whichever comes first).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::codec::{BincodeCodec, LogCodec};
use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::event::{unix_now, ChannelSet, Event};
use crate::store::EventLog;
use crate::wakeup::WakeupChannel;
use crate::worker;

/// Options for a subscriber loop.
#[derive(Default)]
pub struct SubscribeOptions {
    /// Replay start cursor. Defaults to now minus the backlog window.
    pub since: Option<f64>,
    /// External liveness condition, checked once per cycle. When it turns
    /// false the loop exits; the poll timeout bounds how long that takes.
    pub liveness: Option<Box<dyn FnMut() -> bool>>,
    /// Host-specific flush hook (e.g. a streaming response), invoked after
    /// each snapshot scan.
    pub flush: Option<Box<dyn FnMut()>>,
}

impl SubscribeOptions {
    /// Start replay at `timestamp` instead of the backlog default.
    pub fn since(timestamp: f64) -> Self {
        Self {
            since: Some(timestamp),
            ..Self::default()
        }
    }

    pub fn with_liveness(mut self, liveness: impl FnMut() -> bool + 'static) -> Self {
        self.liveness = Some(Box::new(liveness));
        self
    }

    pub fn with_flush(mut self, flush: impl FnMut() + 'static) -> Self {
        self.flush = Some(Box::new(flush));
        self
    }
}

/// A handle to the shared-filesystem bus.
///
/// Handles are cheap to construct and independent: processes (or worker
/// roles) coordinate only through the log file and the wakeup pipes.
pub struct Bus {
    config: BusConfig,
    log: EventLog,
    wakeup: WakeupChannel,
}

impl Bus {
    /// Open a bus with the default bincode codec.
    pub fn open(config: BusConfig) -> Result<Self> {
        Self::with_codec(config, Arc::new(BincodeCodec))
    }

    /// Open a bus with an injected log codec.
    pub fn with_codec(config: BusConfig, codec: Arc<dyn LogCodec>) -> Result<Self> {
        let wakeup = WakeupChannel::open(&config.wakeup_path)?;
        let log = EventLog::open(&config.log_path, config.backlog_seconds, codec);

        info!(
            log = %config.log_path.display(),
            wakeup = %config.wakeup_path.display(),
            backlog_seconds = config.backlog_seconds,
            "bus opened"
        );

        Ok(Self {
            config,
            log,
            wakeup,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The underlying event log, mainly for inspection and tests.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Append an event and wake every blocked subscriber.
    ///
    /// Returns after the durable write and the wakeup fan-out; a lock or
    /// I/O failure surfaces as the error, with nothing written.
    pub fn publish(&self, channels: impl Into<ChannelSet>, payload: &[u8]) -> Result<()> {
        let channels = channels.into();
        if channels.is_empty() {
            return Err(BusError::EmptyChannels);
        }

        let now = unix_now();
        self.log
            .append_and_trim(Event::new(channels, payload.to_vec(), now), now)?;
        self.wakeup.signal()
    }

    /// Subscribe with default options: replay from now minus the backlog
    /// window, no liveness bound, no flush hook.
    pub fn subscribe<F>(&self, channels: impl Into<ChannelSet>, callback: F) -> Result<()>
    where
        F: FnMut(&Event) -> bool,
    {
        self.subscribe_with(channels, SubscribeOptions::default(), callback)
    }

    /// Replay matching backlog events, then block for new ones.
    ///
    /// Each cycle reads a snapshot and walks it newest first, dispatching
    /// events newer than the cursor whose channels intersect the
    /// subscription (the wildcard on either side matches everything). The
    /// callback's return value decides whether the loop keeps running.
    /// Within one cycle, multiple new events are therefore delivered in
    /// reverse-chronological order.
    ///
    /// Blocks until the callback returns `false` or the liveness hook turns
    /// false; only lock and I/O failures return an error.
    pub fn subscribe_with<F>(
        &self,
        channels: impl Into<ChannelSet>,
        mut options: SubscribeOptions,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&Event) -> bool,
    {
        let channels = channels.into();
        if channels.is_empty() {
            return Err(BusError::EmptyChannels);
        }

        let slot = self.wakeup.subscriber_slot()?;
        let timeout = Duration::from_millis(self.config.poll_timeout_ms);
        let mut last_timestamp = options
            .since
            .unwrap_or_else(|| unix_now() - self.config.backlog_seconds);
        let mut running = true;

        debug!(
            pipe = %slot.path().display(),
            since = last_timestamp,
            "subscriber loop started"
        );

        loop {
            if let Some(alive) = options.liveness.as_mut() {
                if !alive() {
                    break;
                }
            }

            let events = self.log.read_snapshot()?;
            for event in &events {
                if event.timestamp <= last_timestamp {
                    // The sequence is time-descending: everything past this
                    // point was already processed.
                    break;
                }
                if channels.matches(&event.channels) {
                    running = callback(event);
                }
            }

            // Unmatched events advance the cursor too; it never regresses.
            if let Some(newest) = events.first() {
                if newest.timestamp > last_timestamp {
                    last_timestamp = newest.timestamp;
                }
            }

            if let Some(flush) = options.flush.as_mut() {
                flush();
            }

            if !running {
                break;
            }

            slot.wait(timeout)?;
        }

        Ok(())
    }

    /// Split into the heartbeat and ingest worker roles. Returns only when
    /// a role fails; see [`worker`](crate::worker).
    pub fn run_as_worker(&self) -> Result<()> {
        worker::run(self)
    }
}
