//! fifobus-worker: the always-running heartbeat + ingest process pair.
//!
//! Loads configuration (YAML file named by `FIFOBUS_CONFIG`, environment
//! overrides on top), then runs both worker roles until one fails. Log
//! verbosity comes from `FIFOBUS_LOG` (default `info`).

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fifobus::{Bus, BusConfig};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("FIFOBUS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match BusConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(
        log = %config.log_path.display(),
        wakeup = %config.wakeup_path.display(),
        backlog_seconds = config.backlog_seconds,
        "starting fifobus worker"
    );

    let bus = match Bus::open(config) {
        Ok(bus) => bus,
        Err(e) => {
            error!(error = %e, "failed to open bus");
            std::process::exit(1);
        }
    };

    if let Err(e) = bus.run_as_worker() {
        error!(error = %e, "worker terminated");
        std::process::exit(1);
    }
}
