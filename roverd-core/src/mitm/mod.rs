//! Telemetry ingest and the in-memory latest-data map.

mod ingest;
mod latest;
mod queue;

pub use ingest::{IngestOutcome, MitmIngest};
pub use latest::{DeviceParams, DeviceStatus, LatestDataMap};
pub use queue::TelemetryQueue;
