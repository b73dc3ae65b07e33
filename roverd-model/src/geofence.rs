//! Persisted geofence records. Parsing into polygon rings happens in
//! the core's geofence engine.

use crate::ids::GeofenceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceKind {
    /// Legacy text format: `[name]` headers followed by `lat,lng` lines.
    Polygon,
    /// JSON array of rings, each ring an array of `[lat, lng]` pairs.
    Geojson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub id: GeofenceId,
    pub name: String,
    pub kind: GeofenceKind,
    /// Raw fence data in the format indicated by `kind`.
    pub data: String,
}
