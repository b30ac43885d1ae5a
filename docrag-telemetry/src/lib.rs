//! Logging setup for docrag ingestion and retrieval.
//!
//! [`init_telemetry`] installs a human-readable `tracing` subscriber and
//! [`init_json_telemetry`] a JSON-lines one. Both honour `RUST_LOG` and fall
//! back to `info`. [`EventCaptureLayer`] records events in memory so tests can
//! assert on what the pipeline logged.

mod memory;

#[cfg(test)]
mod test_capture;

pub use memory::{CapturedEvent, CapturedEvents, EventCaptureLayer};

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global fmt subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry(service_name: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry().with(env_filter()).with(fmt::layer().with_target(true)).try_init()?;
    tracing::info!(service = service_name, "telemetry initialized");
    Ok(())
}

/// Install a global subscriber that writes one JSON object per event.
pub fn init_json_telemetry(service_name: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_current_span(true))
        .try_init()?;
    tracing::info!(service = service_name, "telemetry initialized");
    Ok(())
}

/// Install a global subscriber that logs to stderr and also records every
/// event into `events`.
pub fn init_with_capture(service_name: &str, events: CapturedEvents) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EventCaptureLayer::new(events))
        .try_init()?;
    tracing::info!(service = service_name, "telemetry initialized");
    Ok(())
}
