//! Scan areas and their mode-specific knobs.

use crate::ids::{AreaId, GeofenceId, RoutecalcId};
use serde::{Deserialize, Serialize};

/// What kind of work an area produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaMode {
    Idle,
    IvMitm,
    MonMitm,
    Pokestops,
    RaidsMitm,
    InitMitm,
}

impl AreaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AreaMode::Idle => "idle",
            AreaMode::IvMitm => "iv_mitm",
            AreaMode::MonMitm => "mon_mitm",
            AreaMode::Pokestops => "pokestops",
            AreaMode::RaidsMitm => "raids_mitm",
            AreaMode::InitMitm => "init_mitm",
        }
    }

    /// iv_mitm areas are fed purely from the priority queue; idle areas
    /// produce no work at all.
    pub fn uses_route(&self) -> bool {
        !matches!(self, AreaMode::Idle | AreaMode::IvMitm)
    }
}

impl std::str::FromStr for AreaMode {
    type Err = crate::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AreaMode::Idle),
            "iv_mitm" => Ok(AreaMode::IvMitm),
            "mon_mitm" => Ok(AreaMode::MonMitm),
            "pokestops" => Ok(AreaMode::Pokestops),
            "raids_mitm" => Ok(AreaMode::RaidsMitm),
            "init_mitm" => Ok(AreaMode::InitMitm),
            other => Err(crate::ModelError::InvalidValue(format!("area mode {other}"))),
        }
    }
}

impl std::fmt::Display for AreaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route building algorithm for an area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteCalcAlgorithm {
    /// Cluster and tour.
    #[default]
    Route,
    /// Emit the seeded coordinates in input order, no clustering.
    Routefree,
}

/// A scan area as configured by the operator. Mode-specific parameters
/// are flattened; variants ignore the knobs they do not use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub name: String,
    pub mode: AreaMode,
    pub geofence_included: GeofenceId,
    pub geofence_excluded: Option<GeofenceId>,
    pub routecalc_id: Option<RoutecalcId>,
    pub algorithm: RouteCalcAlgorithm,

    /// Movement speed used for clustering decisions, km/h. 0 = teleport.
    #[serde(default)]
    pub speed: f64,
    /// Clustering disc radius in meters.
    #[serde(default = "default_max_radius")]
    pub max_radius: f64,
    /// Maximum points covered by one clustering disc.
    #[serde(default = "default_max_coords_within_radius")]
    pub max_coords_within_radius: usize,

    /// Seconds to wait after a priority event before it may be handed out.
    #[serde(default)]
    pub delay_after_prio_event: Option<i64>,
    /// Collapse priority events within this many seconds of each other.
    #[serde(default)]
    pub priority_queue_clustering_timedelta: Option<i64>,
    /// Drop priority events older than this backlog, seconds. 0 = keep all.
    #[serde(default)]
    pub remove_from_queue_backlog: Option<i64>,
    /// Cap on the priority queue size after clustering. 0 = unlimited.
    #[serde(default)]
    pub max_clustering: usize,
    /// When true the priority queue always wins over the route.
    #[serde(default)]
    pub starve_route: bool,

    /// init_mitm: walk a generated grid instead of seeded observations.
    #[serde(default)]
    pub init: bool,
    /// Grid level for init mode; larger level = finer lattice.
    #[serde(default = "default_init_grid_level")]
    pub init_grid_level: u8,
    /// raids_mitm: also seed pokestop coordinates.
    #[serde(default)]
    pub including_stops: bool,
    /// pokestops: leveling variant with nearest-unvisited lookup.
    #[serde(default)]
    pub level: bool,
    /// raids_mitm: ignore hatches with less remaining time, seconds.
    #[serde(default)]
    pub min_time_left_seconds: Option<i64>,
    /// mon_mitm: restrict spawnpoint seeding to one event.
    #[serde(default)]
    pub include_event_id: Option<i32>,
}

fn default_max_radius() -> f64 {
    120.0
}

fn default_max_coords_within_radius() -> usize {
    60
}

fn default_init_grid_level() -> u8 {
    15
}

impl Area {
    /// A minimal area used by tests; callers override what they need.
    pub fn for_mode(id: AreaId, name: &str, mode: AreaMode, fence: GeofenceId) -> Self {
        Area {
            id,
            name: name.to_string(),
            mode,
            geofence_included: fence,
            geofence_excluded: None,
            routecalc_id: None,
            algorithm: RouteCalcAlgorithm::Route,
            speed: 0.0,
            max_radius: default_max_radius(),
            max_coords_within_radius: default_max_coords_within_radius(),
            delay_after_prio_event: Some(0),
            priority_queue_clustering_timedelta: None,
            remove_from_queue_backlog: None,
            max_clustering: 0,
            starve_route: false,
            init: false,
            init_grid_level: default_init_grid_level(),
            including_stops: false,
            level: false,
            min_time_left_seconds: None,
            include_event_id: None,
        }
    }
}
