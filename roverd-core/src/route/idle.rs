//! Idle route manager: parks devices without handing out work.

use super::{ManagerState, RouteManager, RouteManagerConfig, RouteManagerStats};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use roverd_model::{AreaId, AreaMode, Location};
use std::collections::BTreeSet;

pub struct IdleRouteManager {
    config: RouteManagerConfig,
    state: Mutex<ManagerState>,
    registered: Mutex<BTreeSet<String>>,
}

impl IdleRouteManager {
    pub fn new(config: RouteManagerConfig) -> Self {
        IdleRouteManager {
            config,
            state: Mutex::new(ManagerState::Unstarted),
            registered: Mutex::new(BTreeSet::new()),
        }
    }
}

#[async_trait]
impl RouteManager for IdleRouteManager {
    fn area_id(&self) -> AreaId {
        self.config.area_id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mode(&self) -> AreaMode {
        AreaMode::Idle
    }

    async fn start(&self) -> Result<bool> {
        *self.state.lock() = ManagerState::Running;
        Ok(true)
    }

    async fn stop(&self) {
        *self.state.lock() = ManagerState::Stopped;
    }

    fn register_device(&self, origin: &str) {
        self.registered.lock().insert(origin.to_string());
    }

    fn unregister_device(&self, origin: &str) {
        self.registered.lock().remove(origin);
    }

    fn get_next_location(&self, _origin: &str) -> Option<Location> {
        None
    }

    fn add_priority_event(&self, _due_at: i64, _location: Location) {}

    fn redo_stop(&self, _origin: &str, _location: Location) {}

    async fn recalc(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> RouteManagerStats {
        RouteManagerStats {
            name: self.config.name.clone(),
            mode: AreaMode::Idle,
            state: *self.state.lock(),
            coords_total: 0,
            prio_queue_len: 0,
            registered_devices: self.registered.lock().iter().cloned().collect(),
            rounds: Vec::new(),
        }
    }

    fn rounds_completed(&self, _origin: &str) -> u64 {
        0
    }

    fn remaining_coords(&self) -> usize {
        0
    }

    fn registered_count(&self) -> usize {
        self.registered.lock().len()
    }

    fn report_position(&self, _origin: &str, _location: Location) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_hands_out_work() {
        let rm = IdleRouteManager::new(RouteManagerConfig {
            area_id: AreaId(9),
            name: "parking".into(),
            mode: AreaMode::Idle,
            routecalc_id: None,
            calc_params: crate::routecalc::RouteCalcParams::default(),
            delay_after_prio_event: None,
            clustering_timedelta: None,
            remove_from_queue_backlog: None,
            max_clustering: 0,
            starve_route: false,
        });
        assert!(rm.start().await.unwrap());
        rm.register_device("d1");
        assert!(rm.get_next_location("d1").is_none());
        assert_eq!(rm.registered_count(), 1);
    }
}
