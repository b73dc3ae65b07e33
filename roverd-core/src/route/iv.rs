//! IV route manager: purely event driven. There is no underlying
//! route; devices only receive due priority events.

use super::{ManagerState, RouteManager, RouteManagerConfig, RouteManagerStats, now_ts};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use roverd_model::{AreaId, AreaMode, Location};
use std::collections::BTreeSet;
use tracing::info;

struct Inner {
    state: ManagerState,
    registered: BTreeSet<String>,
    prio: super::PriorityQueue,
}

pub struct IvRouteManager {
    config: RouteManagerConfig,
    inner: Mutex<Inner>,
}

impl IvRouteManager {
    pub fn new(config: RouteManagerConfig) -> Self {
        let prio = config.new_prio_queue();
        IvRouteManager {
            config,
            inner: Mutex::new(Inner {
                state: ManagerState::Unstarted,
                registered: BTreeSet::new(),
                prio,
            }),
        }
    }
}

#[async_trait]
impl RouteManager for IvRouteManager {
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
        self.inner.lock().state = ManagerState::Running;
        info!(area = %self.config.name, "iv manager started");
        Ok(true)
    }

    async fn stop(&self) {
        self.inner.lock().state = ManagerState::Stopped;
    }

    fn register_device(&self, origin: &str) {
        self.inner.lock().registered.insert(origin.to_string());
    }

    fn unregister_device(&self, origin: &str) {
        self.inner.lock().registered.remove(origin);
    }

    fn get_next_location(&self, origin: &str) -> Option<Location> {
        let mut inner = self.inner.lock();
        if inner.state == ManagerState::Stopped {
            return None;
        }
        inner.registered.insert(origin.to_string());
        let delay = self.config.delay_after_prio_event.unwrap_or(0);
        let event = inner.prio.pop_due(now_ts(), delay)?;
        Some(event.location)
    }

    fn add_priority_event(&self, due_at: i64, location: Location) {
        self.inner.lock().prio.push(due_at, location);
    }

    fn redo_stop(&self, _origin: &str, _location: Location) {}

    async fn recalc(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> RouteManagerStats {
        let inner = self.inner.lock();
        RouteManagerStats {
            name: self.config.name.clone(),
            mode: self.config.mode,
            state: inner.state,
            coords_total: 0,
            prio_queue_len: inner.prio.len(),
            registered_devices: inner.registered.iter().cloned().collect(),
            rounds: Vec::new(),
        }
    }

    fn rounds_completed(&self, _origin: &str) -> u64 {
        0
    }

    fn remaining_coords(&self) -> usize {
        self.inner.lock().prio.len()
    }

    fn registered_count(&self) -> usize {
        self.inner.lock().registered.len()
    }

    fn report_position(&self, _origin: &str, _location: Location) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> IvRouteManager {
        IvRouteManager::new(RouteManagerConfig {
            area_id: AreaId(2),
            name: "iv-area".into(),
            mode: AreaMode::IvMitm,
            routecalc_id: None,
            calc_params: crate::routecalc::RouteCalcParams::default(),
            delay_after_prio_event: Some(0),
            clustering_timedelta: None,
            remove_from_queue_backlog: None,
            max_clustering: 0,
            starve_route: false,
        })
    }

    #[tokio::test]
    async fn hands_out_due_events_only() {
        let rm = manager();
        rm.start().await.unwrap();
        rm.register_device("d1");

        rm.add_priority_event(now_ts() + 3600, Location::new(1.0, 1.0));
        assert!(rm.get_next_location("d1").is_none());

        rm.add_priority_event(now_ts() - 5, Location::new(2.0, 2.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(2.0, 2.0));
    }

    #[tokio::test]
    async fn drains_earliest_due_first() {
        let rm = manager();
        rm.start().await.unwrap();
        rm.add_priority_event(now_ts() - 1, Location::new(2.0, 2.0));
        rm.add_priority_event(now_ts() - 100, Location::new(1.0, 1.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(1.0, 1.0));
        assert_eq!(rm.get_next_location("d1").unwrap(), Location::new(2.0, 2.0));
    }
}
