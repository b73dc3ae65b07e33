//! The ingest path for proto records posted by devices.

use super::{LatestDataMap, TelemetryQueue};
use roverd_model::{LatestEntry, OriginRecord, ProtoRecord};
use std::sync::Arc;
use tracing::{debug, trace};

/// Tally of one ingest call; every request is answered 200, the tally
/// only feeds logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub accepted: usize,
    pub dropped_type: usize,
    pub dropped_stale: usize,
}

pub struct MitmIngest {
    latest: Arc<LatestDataMap>,
    queue: Arc<TelemetryQueue>,
    boot_time: i64,
    /// Drop records whose device timestamp predates controller boot.
    reject_pre_boot: bool,
}

impl MitmIngest {
    pub fn new(
        latest: Arc<LatestDataMap>,
        queue: Arc<TelemetryQueue>,
        boot_time: i64,
        reject_pre_boot: bool,
    ) -> Self {
        MitmIngest {
            latest,
            queue,
            boot_time,
            reject_pre_boot,
        }
    }

    pub fn latest(&self) -> &Arc<LatestDataMap> {
        &self.latest
    }

    pub fn ingest(&self, origin: &str, records: Vec<ProtoRecord>, now: i64) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        for record in records {
            if !record.is_accepted_type() {
                trace!(origin, type_code = record.type_code, "dropping unhandled proto type");
                outcome.dropped_type += 1;
                continue;
            }
            if self.reject_pre_boot && record.timestamp < self.boot_time {
                debug!(origin, type_code = record.type_code, "dropping pre-boot record");
                outcome.dropped_stale += 1;
                continue;
            }
            let entry = LatestEntry {
                ts_raw: record.timestamp,
                ts_received: now,
                location: record.location(),
                payload: record.payload.clone(),
            };
            self.latest.set(origin, record.type_code, entry);
            self.queue.push(OriginRecord {
                origin: origin.to_string(),
                record,
                received_at: now,
            });
            outcome.accepted += 1;
        }
        outcome
    }
}
