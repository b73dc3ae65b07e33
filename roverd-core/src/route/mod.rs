//! Route managers: per-area owners of a scan route, a priority queue
//! overlay and per-device subroutes.
//!
//! One manager exists per area; variants are selected by area mode:
//! `standard` (mon/raids/pokestops/init), `leveling` (pokestops with
//! level flag), `iv` (priority-queue only) and `idle` (no work).

mod factory;
mod idle;
mod iv;
mod leveling;
mod pool;
mod prio;
mod standard;

pub use factory::build_route_manager;
pub use idle::IdleRouteManager;
pub use iv::IvRouteManager;
pub use leveling::{LEVEL_SEARCH_MAX_EXPANSIONS, LevelingRouteManager};
pub use pool::{PositionType, RoutePoolEntry, partition};
pub use prio::{PrioEvent, PriorityQueue};
pub use standard::StandardRouteManager;

use crate::error::Result;
use crate::routecalc::RouteCalcParams;
use async_trait::async_trait;
use roverd_model::{AreaId, AreaMode, Location, RoutecalcId};

/// Lifecycle of a route manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    #[default]
    Unstarted,
    Running,
    /// No new handouts; devices finish their current step and leave.
    Stopped,
}

/// Snapshot of a manager's state for status endpoints.
#[derive(Debug, Clone)]
pub struct RouteManagerStats {
    pub name: String,
    pub mode: AreaMode,
    pub state: ManagerState,
    pub coords_total: usize,
    pub prio_queue_len: usize,
    pub registered_devices: Vec<String>,
    pub rounds: Vec<(String, u64)>,
}

/// Capability set of a route manager; concrete variants implement it.
#[async_trait]
pub trait RouteManager: Send + Sync {
    fn area_id(&self) -> AreaId;
    fn name(&self) -> &str;
    fn mode(&self) -> AreaMode;

    /// Load or calculate the route. Returns false when the area cannot
    /// produce work (no coordinates).
    async fn start(&self) -> Result<bool>;

    /// Stop handing out locations; registered devices drain.
    async fn stop(&self);

    fn register_device(&self, origin: &str);
    fn unregister_device(&self, origin: &str);

    /// Next location for `origin`, arbitrating between the priority
    /// queue and the device's subroute.
    fn get_next_location(&self, origin: &str) -> Option<Location>;

    fn add_priority_event(&self, due_at: i64, location: Location);

    /// Re-inject a coordinate at the head of the device's queue.
    fn redo_stop(&self, origin: &str, location: Location);

    /// Recalculate the route from the seed coordinates and swap it in
    /// atomically; cursors reset.
    async fn recalc(&self) -> Result<()>;

    fn stats(&self) -> RouteManagerStats;

    /// Completed traversals of the device's subroute; the walker's
    /// `round` predicate reads this.
    fn rounds_completed(&self, origin: &str) -> u64;

    /// Coordinates not yet handed out in the current traversal, summed
    /// over registered devices; the walker's `coords` predicate reads
    /// this.
    fn remaining_coords(&self) -> usize;

    fn registered_count(&self) -> usize;

    /// Record the device's last known position.
    fn report_position(&self, origin: &str, location: Location);

    /// Leveling only: mark a stop as visited for `origin`. No-op in
    /// other variants.
    fn mark_visited(&self, _origin: &str, _location: Location) {}

    /// Leveling only: exclude a stop that failed the spinnable test.
    fn ignore_coord(&self, _location: Location) {}
}

/// Static configuration a manager variant is built with, derived from
/// the area settings at snapshot construction.
#[derive(Debug, Clone)]
pub struct RouteManagerConfig {
    pub area_id: AreaId,
    pub name: String,
    pub mode: AreaMode,
    pub routecalc_id: Option<RoutecalcId>,
    pub calc_params: RouteCalcParams,
    /// None disables the priority queue entirely.
    pub delay_after_prio_event: Option<i64>,
    pub clustering_timedelta: Option<i64>,
    pub remove_from_queue_backlog: Option<i64>,
    pub max_clustering: usize,
    pub starve_route: bool,
}

impl RouteManagerConfig {
    pub fn from_area(area: &roverd_model::Area) -> Self {
        RouteManagerConfig {
            area_id: area.id,
            name: area.name.clone(),
            mode: area.mode,
            routecalc_id: area.routecalc_id,
            calc_params: RouteCalcParams {
                max_radius: area.max_radius,
                max_coords_within_radius: area.max_coords_within_radius,
                algorithm: area.algorithm,
                skip_clustering: area.mode == AreaMode::Pokestops,
            },
            delay_after_prio_event: area.delay_after_prio_event,
            clustering_timedelta: area.priority_queue_clustering_timedelta,
            remove_from_queue_backlog: area.remove_from_queue_backlog,
            max_clustering: area.max_clustering,
            starve_route: area.starve_route,
        }
    }

    pub(crate) fn new_prio_queue(&self) -> PriorityQueue {
        PriorityQueue::new(
            self.clustering_timedelta,
            self.remove_from_queue_backlog,
            self.max_clustering,
        )
    }
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
