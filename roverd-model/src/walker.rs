//! Walkers: ordered lists of (area, algorithm) pairs traversed by a device.

use crate::ids::{AreaId, WalkerAreaId, WalkerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Walker {
    pub id: WalkerId,
    pub name: String,
}

/// Predicate deciding whether a walker-area currently accepts a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkerAlgo {
    /// Active for `algo_value` seconds from first entry.
    Countdown,
    /// Active while wall-clock is before `HH:MM` / inside `HH:MM-HH:MM`.
    Timer,
    /// Active until the route manager reports `algo_value` full rounds.
    Round,
    /// Like timer but spanning midnight with date modifiers.
    Period,
    /// Active while the area's route still has coordinates.
    Coords,
    /// Always active; the device parks.
    Idle,
}

impl std::str::FromStr for WalkerAlgo {
    type Err = crate::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "countdown" => Ok(WalkerAlgo::Countdown),
            "timer" => Ok(WalkerAlgo::Timer),
            "round" => Ok(WalkerAlgo::Round),
            "period" => Ok(WalkerAlgo::Period),
            "coords" => Ok(WalkerAlgo::Coords),
            "idle" => Ok(WalkerAlgo::Idle),
            other => Err(crate::ModelError::InvalidValue(format!(
                "walker algorithm {other}"
            ))),
        }
    }
}

/// One entry in a walker. `order` is dense within the parent walker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerArea {
    pub id: WalkerAreaId,
    pub walker_id: WalkerId,
    pub area_id: AreaId,
    pub algo_type: WalkerAlgo,
    #[serde(default)]
    pub algo_value: String,
    pub max_walkers: Option<u32>,
    pub order: i32,
}
