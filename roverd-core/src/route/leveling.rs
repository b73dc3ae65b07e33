//! Leveling route manager: no precomputed tour, each device walks to
//! the nearest stop it has not yet spun.

use super::{ManagerState, RouteManager, RouteManagerConfig, RouteManagerStats};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use roverd_model::{AreaId, AreaMode, Location};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Doublings of the search radius before the search recenters on the
/// fence centroid and falls back to a global nearest scan.
pub const LEVEL_SEARCH_MAX_EXPANSIONS: u32 = 10;

const INITIAL_SEARCH_RADIUS_M: f64 = 200.0;

struct Inner {
    state: ManagerState,
    registered: BTreeSet<String>,
    /// Stops spun per device, keyed by quantized coordinate.
    visited: HashMap<String, HashSet<(i64, i64)>>,
    /// Stops excluded area-wide (not spinnable).
    ignored: HashSet<(i64, i64)>,
    positions: HashMap<String, Location>,
}

pub struct LevelingRouteManager {
    config: RouteManagerConfig,
    stops: Vec<Location>,
    centroid: Location,
    inner: Mutex<Inner>,
}

impl LevelingRouteManager {
    pub fn new(config: RouteManagerConfig, stops: Vec<Location>, centroid: Location) -> Self {
        LevelingRouteManager {
            config,
            stops,
            centroid,
            inner: Mutex::new(Inner {
                state: ManagerState::Unstarted,
                registered: BTreeSet::new(),
                visited: HashMap::new(),
                ignored: HashSet::new(),
                positions: HashMap::new(),
            }),
        }
    }

    fn nearest_unvisited(
        &self,
        inner: &Inner,
        origin: &str,
        from: Location,
        within: Option<f64>,
    ) -> Option<Location> {
        let visited = inner.visited.get(origin);
        self.stops
            .iter()
            .filter(|stop| {
                let key = stop.sort_key();
                !inner.ignored.contains(&key)
                    && visited.is_none_or(|v| !v.contains(&key))
            })
            .filter(|stop| within.is_none_or(|r| from.distance_m(stop) <= r))
            .min_by(|a, b| {
                from.distance_m(a)
                    .total_cmp(&from.distance_m(b))
                    .then_with(|| a.sort_key().cmp(&b.sort_key()))
            })
            .copied()
    }
}

#[async_trait]
impl RouteManager for LevelingRouteManager {
    fn area_id(&self) -> AreaId {
        self.config.area_id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mode(&self) -> AreaMode {
        self.config.mode
    }

    async fn start(&self) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.state = ManagerState::Running;
        info!(
            area = %self.config.name,
            stops = self.stops.len(),
            "leveling manager started"
        );
        Ok(!self.stops.is_empty())
    }

    async fn stop(&self) {
        self.inner.lock().state = ManagerState::Stopped;
    }

    fn register_device(&self, origin: &str) {
        let mut inner = self.inner.lock();
        inner.registered.insert(origin.to_string());
        inner.visited.entry(origin.to_string()).or_default();
    }

    fn unregister_device(&self, origin: &str) {
        let mut inner = self.inner.lock();
        inner.registered.remove(origin);
        inner.positions.remove(origin);
        // Visited sets survive so a rejoining device does not respin.
    }

    fn get_next_location(&self, origin: &str) -> Option<Location> {
        let mut inner = self.inner.lock();
        if inner.state == ManagerState::Stopped {
            return None;
        }
        inner.registered.insert(origin.to_string());
        inner.visited.entry(origin.to_string()).or_default();

        let from = inner
            .positions
            .get(origin)
            .copied()
            .unwrap_or(self.centroid);

        // Expanding ring search around the device; recenter on the
        // fence centroid once the rings run out.
        let mut radius = INITIAL_SEARCH_RADIUS_M;
        for _ in 0..LEVEL_SEARCH_MAX_EXPANSIONS {
            if let Some(stop) = self.nearest_unvisited(&inner, origin, from, Some(radius)) {
                inner.positions.insert(origin.to_string(), stop);
                return Some(stop);
            }
            radius *= 2.0;
        }
        let fallback = self.nearest_unvisited(&inner, origin, self.centroid, None);
        if let Some(stop) = fallback {
            debug!(area = %self.config.name, origin, "recentred stop search on fence centroid");
            inner.positions.insert(origin.to_string(), stop);
        }
        fallback
    }

    fn add_priority_event(&self, _due_at: i64, _location: Location) {}

    fn redo_stop(&self, origin: &str, location: Location) {
        // Forget the visit so the stop is offered again.
        let mut inner = self.inner.lock();
        if let Some(visited) = inner.visited.get_mut(origin) {
            visited.remove(&location.sort_key());
        }
    }

    async fn recalc(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> RouteManagerStats {
        let inner = self.inner.lock();
        RouteManagerStats {
            name: self.config.name.clone(),
            mode: self.config.mode,
            state: inner.state,
            coords_total: self.stops.len(),
            prio_queue_len: 0,
            registered_devices: inner.registered.iter().cloned().collect(),
            rounds: Vec::new(),
        }
    }

    fn rounds_completed(&self, _origin: &str) -> u64 {
        0
    }

    fn remaining_coords(&self) -> usize {
        let inner = self.inner.lock();
        self.stops
            .iter()
            .filter(|stop| {
                let key = stop.sort_key();
                !inner.ignored.contains(&key)
                    && !inner.visited.values().any(|v| v.contains(&key))
            })
            .count()
    }

    fn registered_count(&self) -> usize {
        self.inner.lock().registered.len()
    }

    fn report_position(&self, origin: &str, location: Location) {
        self.inner
            .lock()
            .positions
            .insert(origin.to_string(), location);
    }

    fn mark_visited(&self, origin: &str, location: Location) {
        let mut inner = self.inner.lock();
        inner
            .visited
            .entry(origin.to_string())
            .or_default()
            .insert(location.sort_key());
    }

    fn ignore_coord(&self, location: Location) {
        self.inner.lock().ignored.insert(location.sort_key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roverd_model::RouteCalcAlgorithm;

    fn config() -> RouteManagerConfig {
        RouteManagerConfig {
            area_id: AreaId(3),
            name: "level-area".into(),
            mode: AreaMode::Pokestops,
            routecalc_id: None,
            calc_params: crate::routecalc::RouteCalcParams {
                algorithm: RouteCalcAlgorithm::Routefree,
                ..Default::default()
            },
            delay_after_prio_event: None,
            clustering_timedelta: None,
            remove_from_queue_backlog: None,
            max_clustering: 0,
            starve_route: false,
        }
    }

    fn stops() -> Vec<Location> {
        vec![
            Location::new(0.0, 0.0),
            Location::new(0.0, 0.001),
            Location::new(0.0, 0.002),
        ]
    }

    #[tokio::test]
    async fn hands_out_nearest_unvisited_in_order() {
        let rm = LevelingRouteManager::new(config(), stops(), Location::new(0.0, 0.0));
        rm.start().await.unwrap();
        rm.register_device("d1");

        let first = rm.get_next_location("d1").unwrap();
        assert_eq!(first, Location::new(0.0, 0.0));
        rm.mark_visited("d1", first);

        let second = rm.get_next_location("d1").unwrap();
        assert_eq!(second, Location::new(0.0, 0.001));
        rm.mark_visited("d1", second);

        let third = rm.get_next_location("d1").unwrap();
        assert_eq!(third, Location::new(0.0, 0.002));
        rm.mark_visited("d1", third);

        assert!(rm.get_next_location("d1").is_none());
    }

    #[tokio::test]
    async fn visited_sets_are_per_device() {
        let rm = LevelingRouteManager::new(config(), stops(), Location::new(0.0, 0.0));
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.register_device("d2");

        rm.mark_visited("d1", Location::new(0.0, 0.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(0.0, 0.001));
        // d2 has spun nothing yet.
        assert_eq!(rm.get_next_location("d2").unwrap(), Location::new(0.0, 0.0));
    }

    #[tokio::test]
    async fn ignored_stops_are_excluded_for_everyone() {
        let rm = LevelingRouteManager::new(config(), stops(), Location::new(0.0, 0.0));
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.ignore_coord(Location::new(0.0, 0.0));

        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(0.0, 0.001));
        assert_eq!(rm.remaining_coords(), 2);
    }

    #[tokio::test]
    async fn distant_stop_found_via_fallback_search() {
        // A stop far outside the expanding rings is still reachable
        // through the centroid fallback.
        let far = Location::new(10.0, 10.0);
        let rm = LevelingRouteManager::new(config(), vec![far], Location::new(0.0, 0.0));
        rm.start().await.unwrap();
        rm.register_device("d1");
        assert_eq!(rm.get_next_location("d1").unwrap(), far);
    }

    #[tokio::test]
    async fn redo_stop_forgets_visit() {
        let rm = LevelingRouteManager::new(config(), stops(), Location::new(0.0, 0.0));
        rm.start().await.unwrap();
        rm.register_device("d1");
        let first = rm.get_next_location("d1").unwrap();
        rm.mark_visited("d1", first);
        rm.redo_stop("d1", first);
        assert_eq!(rm.get_next_location("d1").unwrap(), first);
    }
}
