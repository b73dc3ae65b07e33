//! Devices and shared device pools.
//!
//! Per-device knobs shadow pool knobs: if the device has a value set it
//! wins, otherwise the pool value applies, otherwise the default.

use crate::ids::{DeviceId, DevicePoolId, WalkerId};
use serde::{Deserialize, Serialize};

/// Optional knobs carried by both devices and pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Google mails usable on this device, comma separated.
    pub ggl_login_mail: Option<String>,
    /// Seconds without live data before the device is considered stuck.
    pub mitm_wait_timeout: Option<i64>,
    /// Walk speed override in m/s for softban cooldown math.
    pub walk_speed: Option<f64>,
    /// Re-auth on every socket connect.
    pub enhanced_mode_quest: Option<bool>,
    /// Rotate the leased account after this many hours.
    pub account_rotation_hours: Option<i64>,
    /// Extra startup delay in seconds after an app restart.
    pub post_turn_delay: Option<i64>,
}

macro_rules! resolve_knob {
    ($name:ident, $ty:ty) => {
        pub fn $name(&self, pool: Option<&DeviceSettings>) -> Option<$ty> {
            self.settings
                .$name
                .clone()
                .or_else(|| pool.and_then(|p| p.$name.clone()))
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// The origin name; unique within an instance and used as the
    /// identity on every HTTP and socket request.
    pub name: String,
    pub walker_id: WalkerId,
    pub pool_id: Option<DevicePoolId>,
    #[serde(default)]
    pub settings: DeviceSettings,
}

impl Device {
    resolve_knob!(ggl_login_mail, String);
    resolve_knob!(mitm_wait_timeout, i64);
    resolve_knob!(walk_speed, f64);
    resolve_knob!(enhanced_mode_quest, bool);
    resolve_knob!(account_rotation_hours, i64);
    resolve_knob!(post_turn_delay, i64);

    /// Whether `mail` appears in the device's google login list.
    pub fn accepts_google_mail(&self, pool: Option<&DeviceSettings>, mail: &str) -> bool {
        self.ggl_login_mail(pool)
            .map(|list| list.split(',').any(|entry| entry.trim() == mail))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePool {
    pub id: DevicePoolId,
    pub name: String,
    #[serde(default)]
    pub settings: DeviceSettings,
}
