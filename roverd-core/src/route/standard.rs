//! The standard route manager: a static route partitioned into
//! per-device subroutes, overlaid by the priority queue.

use super::pool::{PositionType, RoutePoolEntry, partition};
use super::{ManagerState, RouteManager, RouteManagerConfig, RouteManagerStats, now_ts};
use crate::error::Result;
use crate::routecalc::RouteCalculator;
use async_trait::async_trait;
use parking_lot::Mutex;
use roverd_model::{AreaId, AreaMode, Location};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

struct Inner {
    state: ManagerState,
    coords: Vec<Location>,
    registered: BTreeSet<String>,
    pool: HashMap<String, RoutePoolEntry>,
    prio: super::PriorityQueue,
}

pub struct StandardRouteManager {
    config: RouteManagerConfig,
    calculator: RouteCalculator,
    /// Coordinates seeded from the database at snapshot construction;
    /// recalculation re-tours these.
    seed: Vec<Location>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for StandardRouteManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardRouteManager")
            .field("name", &self.config.name)
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}

impl StandardRouteManager {
    pub fn new(config: RouteManagerConfig, calculator: RouteCalculator, seed: Vec<Location>) -> Self {
        let prio = config.new_prio_queue();
        StandardRouteManager {
            config,
            calculator,
            seed,
            inner: Mutex::new(Inner {
                state: ManagerState::Unstarted,
                coords: Vec::new(),
                registered: BTreeSet::new(),
                pool: HashMap::new(),
                prio,
            }),
        }
    }

    /// Equal-partition the route among registered devices, resetting
    /// queues and keeping round counters.
    fn repartition(inner: &mut Inner) {
        let origins: Vec<String> = inner.registered.iter().cloned().collect();
        if origins.is_empty() {
            return;
        }
        let slices = partition(&inner.coords, origins.len());
        let now = now_ts();
        for (origin, subroute) in origins.into_iter().zip(slices) {
            let rounds = inner.pool.get(&origin).map(|e| e.rounds).unwrap_or(0);
            let mut entry = RoutePoolEntry::new(subroute, now);
            entry.rounds = rounds;
            inner.pool.insert(origin, entry);
        }
    }

    fn install_route(&self, route: Vec<Location>) {
        let mut inner = self.inner.lock();
        inner.coords = route;
        Self::repartition(&mut inner);
    }
}

#[async_trait]
impl RouteManager for StandardRouteManager {
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
        {
            let inner = self.inner.lock();
            if inner.state == ManagerState::Running {
                return Ok(!inner.coords.is_empty());
            }
        }

        // Prefer the persisted route; fall back to calculating from the
        // seed. Both run without holding the manager mutex.
        let route = match self.config.routecalc_id {
            Some(id) => match self.calculator.stored_route(id).await? {
                Some(route) => route,
                None => {
                    self.calculator
                        .recalculate(id, self.seed.clone(), self.config.calc_params.clone(), true)
                        .await?
                }
            },
            None => crate::routecalc::calculate(&self.seed, &self.config.calc_params),
        };

        let has_work = !route.is_empty();
        {
            let mut inner = self.inner.lock();
            inner.coords = route;
            Self::repartition(&mut inner);
            inner.state = ManagerState::Running;
        }
        info!(
            area = %self.config.name,
            mode = %self.config.mode,
            "route manager started"
        );
        Ok(has_work)
    }

    async fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.state = ManagerState::Stopped;
        info!(area = %self.config.name, "route manager stopped");
    }

    fn register_device(&self, origin: &str) {
        let mut inner = self.inner.lock();
        if inner.registered.insert(origin.to_string()) {
            debug!(area = %self.config.name, origin, "device registered");
            Self::repartition(&mut inner);
        }
    }

    fn unregister_device(&self, origin: &str) {
        let mut inner = self.inner.lock();
        inner.registered.remove(origin);
        inner.pool.remove(origin);
        // Survivors keep their subroutes until the next recalc.
    }

    fn get_next_location(&self, origin: &str) -> Option<Location> {
        let mut inner = self.inner.lock();
        if inner.state == ManagerState::Stopped {
            return None;
        }
        if !inner.registered.contains(origin) {
            inner.registered.insert(origin.to_string());
            Self::repartition(&mut inner);
        }

        let now = now_ts();
        let last_type = inner
            .pool
            .get(origin)
            .map(|e| e.last_position_type)
            .unwrap_or_default();

        // Round-robin between queue and route: the queue is consulted
        // unless this device just served a prio event, except under
        // starve_route where the queue always wins while non-empty.
        if let Some(delay) = self.config.delay_after_prio_event {
            if last_type != PositionType::Prio || self.config.starve_route {
                if let Some(event) = inner.prio.pop_due(now, delay) {
                    if let Some(entry) = inner.pool.get_mut(origin) {
                        entry.last_position_type = PositionType::Prio;
                        entry.current_pos = Some(event.location);
                        entry.last_access = now;
                    }
                    debug!(
                        area = %self.config.name,
                        origin,
                        lat = event.location.lat,
                        lng = event.location.lng,
                        "handing out priority event"
                    );
                    return Some(event.location);
                }
            }
        }

        let entry = inner.pool.get_mut(origin)?;
        let next = entry.next_route_coord()?;
        entry.last_position_type = PositionType::Normal;
        entry.current_pos = Some(next);
        entry.last_access = now;
        Some(next)
    }

    fn add_priority_event(&self, due_at: i64, location: Location) {
        if self.config.delay_after_prio_event.is_none() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.prio.push(due_at, location);
    }

    fn redo_stop(&self, origin: &str, location: Location) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.pool.get_mut(origin) {
            entry.redo(location);
        }
    }

    async fn recalc(&self) -> Result<()> {
        let route = match self.config.routecalc_id {
            Some(id) => {
                self.calculator
                    .recalculate(id, self.seed.clone(), self.config.calc_params.clone(), true)
                    .await?
            }
            None => crate::routecalc::calculate(&self.seed, &self.config.calc_params),
        };
        self.install_route(route);
        Ok(())
    }

    fn stats(&self) -> RouteManagerStats {
        let inner = self.inner.lock();
        RouteManagerStats {
            name: self.config.name.clone(),
            mode: self.config.mode,
            state: inner.state,
            coords_total: inner.coords.len(),
            prio_queue_len: inner.prio.len(),
            registered_devices: inner.registered.iter().cloned().collect(),
            rounds: inner
                .pool
                .iter()
                .map(|(origin, entry)| (origin.clone(), entry.rounds))
                .collect(),
        }
    }

    fn rounds_completed(&self, origin: &str) -> u64 {
        self.inner
            .lock()
            .pool
            .get(origin)
            .map(|e| e.rounds)
            .unwrap_or(0)
    }

    fn remaining_coords(&self) -> usize {
        self.inner
            .lock()
            .pool
            .values()
            .map(|e| e.queue.len())
            .sum()
    }

    fn registered_count(&self) -> usize {
        self.inner.lock().registered.len()
    }

    fn report_position(&self, origin: &str, location: Location) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.pool.get_mut(origin) {
            entry.current_pos = Some(location);
            entry.last_access = now_ts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryStore;
    use roverd_model::AreaMode;
    use std::sync::Arc;

    fn manager(coords: Vec<Location>, starve_route: bool) -> StandardRouteManager {
        let config = RouteManagerConfig {
            area_id: AreaId(1),
            name: "test-area".into(),
            mode: AreaMode::MonMitm,
            routecalc_id: None,
            calc_params: crate::routecalc::RouteCalcParams {
                algorithm: roverd_model::RouteCalcAlgorithm::Routefree,
                ..Default::default()
            },
            delay_after_prio_event: Some(0),
            clustering_timedelta: None,
            remove_from_queue_backlog: None,
            max_clustering: 0,
            starve_route,
        };
        let calculator = RouteCalculator::new(Arc::new(MemoryStore::default()));
        StandardRouteManager::new(config, calculator, coords)
    }

    fn scenario_coords() -> Vec<Location> {
        vec![
            Location::new(0.0, 0.0),
            Location::new(0.0, 1.0),
            Location::new(0.0, 2.0),
        ]
    }

    #[tokio::test]
    async fn priority_preempts_route_then_round_robins() {
        // End-to-end scenario 1: due prio event first, then the route
        // resumes, and the next handout alternates back to the route.
        let rm = manager(scenario_coords(), false);
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.add_priority_event(now_ts() - 1, Location::new(5.0, 5.0));

        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(5.0, 5.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(0.0, 0.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(0.0, 1.0));
    }

    #[tokio::test]
    async fn starve_route_drains_queue_first() {
        let rm = manager(scenario_coords(), true);
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.add_priority_event(now_ts() - 10, Location::new(5.0, 5.0));
        rm.add_priority_event(now_ts() - 5, Location::new(6.0, 6.0));

        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(5.0, 5.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(6.0, 6.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(0.0, 0.0));
    }

    #[tokio::test]
    async fn subroutes_union_equals_route() {
        // Property 3 at the manager level.
        let rm = manager(scenario_coords(), false);
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.register_device("d2");

        let stats = rm.stats();
        assert_eq!(stats.registered_devices.len(), 2);
        let inner = rm.inner.lock();
        let union: Vec<Location> = inner
            .pool
            .values()
            .flat_map(|e| e.subroute.iter().copied())
            .collect();
        assert_eq!(union.len(), 3);
        for c in scenario_coords() {
            assert!(union.contains(&c));
        }
    }

    #[tokio::test]
    async fn rounds_increment_on_rewrap() {
        let rm = manager(scenario_coords(), false);
        rm.start().await.unwrap();
        rm.register_device("d1");
        for _ in 0..3 {
            rm.get_next_location("d1");
        }
        assert_eq!(rm.rounds_completed("d1"), 0);
        rm.get_next_location("d1");
        assert_eq!(rm.rounds_completed("d1"), 1);
    }

    #[tokio::test]
    async fn stopped_manager_hands_out_nothing() {
        let rm = manager(scenario_coords(), false);
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.stop().await;
        assert!(rm.get_next_location("d1").is_none());
    }

    #[tokio::test]
    async fn redo_stop_reinjects_at_head() {
        let rm = manager(scenario_coords(), false);
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.get_next_location("d1");
        rm.redo_stop("d1", Location::new(9.0, 9.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(9.0, 9.0));
    }

    #[tokio::test]
    async fn unregister_releases_subroute_without_repartition() {
        let rm = manager(scenario_coords(), false);
        rm.start().await.unwrap();
        rm.register_device("d1");
        rm.register_device("d2");
        let before = rm.rounds_completed("d1");
        rm.unregister_device("d2");
        assert_eq!(rm.registered_count(), 1);
        // d1's entry is untouched.
        assert_eq!(rm.rounds_completed("d1"), before);
    }
}
