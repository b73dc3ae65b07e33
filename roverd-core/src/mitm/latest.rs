//! The latest-data map: `origin → type → LatestEntry`, memory only.
//! Reboot loses state by design.

use dashmap::DashMap;
use roverd_model::{AreaMode, LatestEntry, Location};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct DeviceData {
    by_type: HashMap<u16, LatestEntry>,
    injected: bool,
    last_mode: Option<AreaMode>,
    /// Set when routing hands the device a new location; consumers use
    /// it to invalidate stale telemetry.
    last_possibly_moved: Option<i64>,
}

/// The values a polling device receives from `get_latest_mitm`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceParams {
    pub ids_iv: Vec<i32>,
    pub injected_settings: serde_json::Value,
    pub ids_encountered: Vec<i64>,
    pub safe_items: Vec<i32>,
    pub lvl_mode: bool,
    pub unquest_stops: Vec<Location>,
    pub check_lured: bool,
}

/// Per-origin view for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub origin: String,
    pub injected: bool,
    pub last_data_ts: Option<i64>,
    pub last_mode: Option<AreaMode>,
    pub last_possibly_moved: Option<i64>,
}

#[derive(Default)]
pub struct LatestDataMap {
    devices: DashMap<String, DeviceData>,
    params: DashMap<String, DeviceParams>,
}

impl LatestDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry unless a newer one is already present for the
    /// same `(origin, type)`.
    pub fn set(&self, origin: &str, type_code: u16, entry: LatestEntry) {
        let mut device = self.devices.entry(origin.to_string()).or_default();
        match device.by_type.get(&type_code) {
            Some(existing) if existing.ts_received > entry.ts_received => {}
            _ => {
                device.by_type.insert(type_code, entry);
            }
        }
    }

    pub fn get(&self, origin: &str, type_code: u16) -> Option<LatestEntry> {
        self.devices
            .get(origin)
            .and_then(|d| d.by_type.get(&type_code).cloned())
    }

    /// Newest `ts_received` across all types of one origin.
    pub fn last_data_ts(&self, origin: &str) -> Option<i64> {
        self.devices
            .get(origin)?
            .by_type
            .values()
            .map(|e| e.ts_received)
            .max()
    }

    pub fn set_injected(&self, origin: &str, injected: bool) {
        self.devices.entry(origin.to_string()).or_default().injected = injected;
    }

    pub fn set_last_mode(&self, origin: &str, mode: AreaMode) {
        self.devices.entry(origin.to_string()).or_default().last_mode = Some(mode);
    }

    pub fn touch_possibly_moved(&self, origin: &str, ts: i64) {
        self.devices
            .entry(origin.to_string())
            .or_default()
            .last_possibly_moved = Some(ts);
    }

    pub fn set_params(&self, origin: &str, params: DeviceParams) {
        self.params.insert(origin.to_string(), params);
    }

    pub fn params(&self, origin: &str) -> DeviceParams {
        self.params
            .get(origin)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn status(&self, origin: &str) -> Option<DeviceStatus> {
        let device = self.devices.get(origin)?;
        Some(DeviceStatus {
            origin: origin.to_string(),
            injected: device.injected,
            last_data_ts: device.by_type.values().map(|e| e.ts_received).max(),
            last_mode: device.last_mode,
            last_possibly_moved: device.last_possibly_moved,
        })
    }

    pub fn status_all(&self) -> Vec<DeviceStatus> {
        let mut out: Vec<DeviceStatus> = self
            .devices
            .iter()
            .map(|entry| DeviceStatus {
                origin: entry.key().clone(),
                injected: entry.injected,
                last_data_ts: entry.by_type.values().map(|e| e.ts_received).max(),
                last_mode: entry.last_mode,
                last_possibly_moved: entry.last_possibly_moved,
            })
            .collect();
        out.sort_by(|a, b| a.origin.cmp(&b.origin));
        out
    }
}
