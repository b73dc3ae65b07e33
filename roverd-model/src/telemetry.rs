//! Telemetry records forwarded by devices over HTTP.
//!
//! The core treats each intercepted message as an opaque payload tagged
//! with a small integer type code, a timestamp and a coordinate.

use crate::location::Location;
use serde::{Deserialize, Serialize};

/// Type codes the ingest accepts; everything else is dropped.
pub const ACCEPTED_PROTO_TYPES: [u16; 6] = [4, 101, 102, 104, 106, 156];

/// Types that must survive backpressure drops (encounter, GMO).
pub const ESSENTIAL_PROTO_TYPES: [u16; 2] = [102, 106];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtoRecord {
    #[serde(rename = "type")]
    pub type_code: u16,
    pub timestamp: i64,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ProtoRecord {
    pub fn is_accepted_type(&self) -> bool {
        ACCEPTED_PROTO_TYPES.contains(&self.type_code)
    }

    pub fn is_essential(&self) -> bool {
        ESSENTIAL_PROTO_TYPES.contains(&self.type_code)
    }

    /// Out-of-range coordinates are canonicalized to (0,0).
    pub fn location(&self) -> Location {
        let loc = Location::new(self.lat, self.lng);
        if loc.is_valid() { loc } else { Location::default() }
    }
}

/// Most recent payload of one type for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestEntry {
    /// Timestamp as reported by the device.
    pub ts_raw: i64,
    /// Wall-clock of reception on the controller.
    pub ts_received: i64,
    pub location: Location,
    pub payload: serde_json::Value,
}

/// A record stamped with its origin, forwarded to downstream consumers.
#[derive(Debug, Clone)]
pub struct OriginRecord {
    pub origin: String,
    pub record: ProtoRecord,
    pub received_at: i64,
}
