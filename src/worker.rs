//! The two-role worker: heartbeat and ingest.
//!
//! The heartbeat role publishes to the `heartbeat` channel once a second,
//! giving every other process a liveness signal to watch. The ingest role
//! subscribes to everything and reports throughput once a second. The roles
//! run as independent units, each with its own bus handle, sharing nothing
//! but the files on disk. There is no supervision between them: a role that
//! fails logs the error and stops, and its sibling continues unaware.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::bus::Bus;
use crate::error::{BusError, Result};
use crate::event::ALL_CHANNELS;

/// Channel the heartbeat role publishes to.
pub const HEARTBEAT_CHANNEL: &str = "heartbeat";

/// Interval between heartbeat publishes and between ingest reports.
const ROLE_INTERVAL: Duration = Duration::from_secs(1);

/// Run both worker roles. Never returns while the roles are healthy.
///
/// Fails fast with [`BusError::RequestContext`] on a request-scoped bus:
/// worker roles block forever and must not live inside a request handler.
pub(crate) fn run(bus: &Bus) -> Result<()> {
    if bus.config().request_scoped {
        return Err(BusError::RequestContext);
    }

    info!(
        log = %bus.config().log_path.display(),
        "starting worker roles"
    );

    let heartbeat_config = bus.config().clone();
    let _heartbeat = thread::Builder::new()
        .name("fifobus-heartbeat".into())
        .spawn(move || {
            let outcome = Bus::open(heartbeat_config).and_then(|bus| heartbeat_loop(&bus));
            if let Err(e) = outcome {
                error!(error = %e, "heartbeat role failed");
            }
        })
        .map_err(BusError::Thread)?;

    let outcome = ingest_loop(bus);
    if let Err(ref e) = outcome {
        error!(error = %e, "ingest role failed");
    }
    outcome
}

/// Publish an empty event to the heartbeat channel once per interval,
/// forever. Only a fatal log error ends the loop.
fn heartbeat_loop(bus: &Bus) -> Result<()> {
    info!(channel = HEARTBEAT_CHANNEL, "heartbeat role started");
    loop {
        thread::sleep(ROLE_INTERVAL);
        bus.publish(HEARTBEAT_CHANNEL, b"")?;
    }
}

/// Subscribe to everything and report events-per-interval throughput.
fn ingest_loop(bus: &Bus) -> Result<()> {
    info!("ingest role started");

    let mut seen: u64 = 0;
    let mut window_start = Instant::now();

    bus.subscribe(ALL_CHANNELS, move |_event| {
        seen += 1;
        let elapsed = window_start.elapsed();
        if elapsed >= ROLE_INTERVAL {
            info!(
                events = seen,
                interval_secs = elapsed.as_secs_f64(),
                "ingest throughput"
            );
            seen = 0;
            window_start = Instant::now();
        }
        true
    })
}
