//! The mapping manager: the read-mostly configuration snapshot and the
//! route managers it owns.

mod grid;

pub use grid::{cell_edge_m, lattice};

use crate::error::{CoreError, Result};
use crate::geofence::{GeofenceHelper, parse_geofence_data};
use crate::persistence::Repositories;
use crate::route::{RouteManager, build_route_manager};
use crate::routecalc::RouteCalculator;
use crate::walker::{WalkerContext, WalkerCursor, WalkerDecision, WalkerFsm};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use roverd_model::{
    Area, AreaId, AreaMode, Auth, Device, DeviceId, DeviceSettings, Location, Walker, WalkerAreaId,
    WalkerId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One consistent view of the configuration, swapped atomically on
/// reload. Entities reference each other by id only.
pub struct MappingSnapshot {
    pub devices: HashMap<String, Device>,
    pub pool_settings: HashMap<DeviceId, DeviceSettings>,
    pub walkers: HashMap<WalkerId, Walker>,
    pub walker_fsms: HashMap<WalkerId, WalkerFsm>,
    pub areas: HashMap<AreaId, Area>,
    pub geofence_helpers: HashMap<AreaId, GeofenceHelper>,
    pub route_managers: HashMap<AreaId, Arc<dyn RouteManager>>,
    pub auths: Vec<Auth>,
}

impl std::fmt::Debug for MappingSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingSnapshot")
            .field("devices", &self.devices.len())
            .field("areas", &self.areas.len())
            .field("walkers", &self.walkers.len())
            .finish_non_exhaustive()
    }
}

impl MappingSnapshot {
    pub fn device(&self, origin: &str) -> Option<&Device> {
        self.devices.get(origin)
    }

    /// Resolve a device knob with pool fallback.
    pub fn device_settings<'a>(&'a self, device: &'a Device) -> Option<&'a DeviceSettings> {
        self.pool_settings.get(&device.id)
    }

    pub fn route_manager(&self, area_id: AreaId) -> Option<Arc<dyn RouteManager>> {
        self.route_managers.get(&area_id).cloned()
    }

    /// Basic-auth check against the configured credential set.
    pub fn check_auth(&self, username: &str, password: &str, required: roverd_model::AuthLevel) -> bool {
        self.auths
            .iter()
            .any(|a| a.username == username && a.password == password && a.permits(required))
    }
}

/// Per-device fields that survive a snapshot swap.
#[derive(Debug, Clone, Default)]
pub struct DeviceTransient {
    pub last_location: Option<Location>,
    pub walker_cursor: WalkerCursor,
    pub walker_area: Option<WalkerAreaId>,
    pub last_known_mode: Option<AreaMode>,
    pub account_rotation_started: Option<i64>,
}

struct SnapshotWalkerContext<'a> {
    snapshot: &'a MappingSnapshot,
    transients: &'a DashMap<String, DeviceTransient>,
}

impl WalkerContext for SnapshotWalkerContext<'_> {
    fn rounds_completed(&self, area_id: AreaId, origin: &str) -> u64 {
        self.snapshot
            .route_manager(area_id)
            .map(|rm| rm.rounds_completed(origin))
            .unwrap_or(0)
    }

    fn remaining_coords(&self, area_id: AreaId) -> usize {
        self.snapshot
            .route_manager(area_id)
            .map(|rm| rm.remaining_coords())
            .unwrap_or(0)
    }

    fn occupancy(&self, walker_area_id: WalkerAreaId) -> usize {
        self.transients
            .iter()
            .filter(|t| t.walker_area == Some(walker_area_id))
            .count()
    }
}

#[derive(Debug)]
pub struct MappingManager {
    repos: Repositories,
    current: RwLock<Arc<MappingSnapshot>>,
    transients: DashMap<String, DeviceTransient>,
    setter_tx: mpsc::UnboundedSender<(DeviceId, String, String)>,
}

impl MappingManager {
    /// Build the initial snapshot and spawn the setter-queue consumer.
    pub async fn new(repos: Repositories) -> Result<Arc<Self>> {
        let snapshot = build_snapshot(&repos).await?;
        let (setter_tx, setter_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(MappingManager {
            repos,
            current: RwLock::new(Arc::new(snapshot)),
            transients: DashMap::new(),
            setter_tx,
        });
        manager.spawn_setter_task(setter_rx);
        Ok(manager)
    }

    pub fn snapshot(&self) -> Arc<MappingSnapshot> {
        self.current.read().clone()
    }

    /// Launch every route manager of the current snapshot.
    pub async fn start_route_managers(&self) -> Result<()> {
        let snapshot = self.snapshot();
        for (area_id, manager) in &snapshot.route_managers {
            let has_work = manager.start().await?;
            if !has_work {
                warn!(area = manager.name(), area_id = area_id.as_i32(), "area has no work");
            }
        }
        Ok(())
    }

    /// Rebuild the snapshot from the database and swap it in. The old
    /// snapshot stays current when the rebuild fails; transients carry
    /// over by living outside the snapshot.
    pub async fn reload(&self) -> Result<()> {
        let rebuilt = match build_snapshot(&self.repos).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(%err, "reload rejected, keeping previous snapshot");
                return Err(err);
            }
        };

        let previous = self.snapshot();
        for manager in previous.route_managers.values() {
            manager.stop().await;
        }
        for manager in rebuilt.route_managers.values() {
            manager.start().await?;
        }
        *self.current.write() = Arc::new(rebuilt);
        // Drop transients of devices that no longer exist.
        let snapshot = self.snapshot();
        self.transients
            .retain(|origin, _| snapshot.devices.contains_key(origin));
        info!("configuration snapshot swapped");
        Ok(())
    }

    pub fn transient(&self, origin: &str) -> DeviceTransient {
        self.transients
            .get(origin)
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn record_location(&self, origin: &str, location: Location) {
        self.transients
            .entry(origin.to_string())
            .or_default()
            .last_location = Some(location);
    }

    /// Run the walker FSM for a device: pick its current walker-area
    /// and hand back the area's route manager.
    pub fn next_assignment(&self, origin: &str) -> Result<Option<(AreaId, Arc<dyn RouteManager>)>> {
        let snapshot = self.snapshot();
        let device = snapshot
            .device(origin)
            .ok_or_else(|| CoreError::NotFound(format!("device {origin}")))?;
        let fsm = snapshot
            .walker_fsms
            .get(&device.walker_id)
            .ok_or_else(|| CoreError::ConfigInvalid(format!("walker missing for {origin}")))?;

        // The occupancy check iterates the transient map, so no entry
        // guard may be held while the FSM runs.
        let mut cursor = self
            .transients
            .entry(origin.to_string())
            .or_default()
            .walker_cursor;
        let decision = {
            let ctx = SnapshotWalkerContext {
                snapshot: &snapshot,
                transients: &self.transients,
            };
            fsm.next_assignment(origin, &mut cursor, Utc::now(), &ctx)
        };

        let mut transient = self.transients.entry(origin.to_string()).or_default();
        transient.walker_cursor = cursor;
        match decision {
            WalkerDecision::Work { index, area_id } => {
                transient.walker_area = fsm.areas().get(index).map(|wa| wa.id);
                if let Some(area) = snapshot.areas.get(&area_id) {
                    transient.last_known_mode = Some(area.mode);
                }
                drop(transient);
                Ok(snapshot.route_manager(area_id).map(|rm| (area_id, rm)))
            }
            WalkerDecision::Sleep { until } => {
                transient.walker_area = None;
                debug!(origin, until, "walker sleeping until next window");
                Ok(None)
            }
            WalkerDecision::Park => {
                transient.walker_area = None;
                Ok(None)
            }
        }
    }

    /// Enqueue a device-setting write; the serialized consumer applies
    /// it so device RPCs never race operator reloads.
    pub fn queue_setting(&self, device: DeviceId, key: &str, value: &str) {
        if self
            .setter_tx
            .send((device, key.to_string(), value.to_string()))
            .is_err()
        {
            error!(device = device.as_i32(), key, "setter queue closed");
        }
    }

    fn spawn_setter_task(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<(DeviceId, String, String)>,
    ) {
        let repos = self.repos.clone();
        tokio::spawn(async move {
            while let Some((device, key, value)) = rx.recv().await {
                if let Err(err) = repos.config.set_device_setting(device, &key, &value).await {
                    error!(device = device.as_i32(), key, %err, "device-setting write failed");
                }
            }
        });
    }
}

/// One logical read pass over the configuration, then pure assembly.
async fn build_snapshot(repos: &Repositories) -> Result<MappingSnapshot> {
    let devices = repos.config.devices().await?;
    let pools = repos.config.device_pools().await?;
    let walkers = repos.config.walkers().await?;
    let walker_areas = repos.config.walker_areas().await?;
    let areas = repos.config.areas().await?;
    let geofences = repos.config.geofences().await?;
    let auths = repos.auth.auths().await?;

    let pools_by_id: HashMap<_, _> = pools.into_iter().map(|p| (p.id, p)).collect();
    let walker_ids: HashSet<_> = walkers.iter().map(|w| w.id).collect();
    let area_ids: HashSet<_> = areas.iter().map(|a| a.id).collect();
    let fences_by_id: HashMap<_, _> = geofences.into_iter().map(|g| (g.id, g)).collect();

    // Referential checks before anything is constructed.
    for device in &devices {
        if !walker_ids.contains(&device.walker_id) {
            return Err(CoreError::ConfigInvalid(format!(
                "device {} references unknown walker {}",
                device.name,
                device.walker_id.as_i32()
            )));
        }
    }
    for wa in &walker_areas {
        if !area_ids.contains(&wa.area_id) {
            return Err(CoreError::ConfigInvalid(format!(
                "walker-area {} references unknown area {}",
                wa.id.as_i32(),
                wa.area_id.as_i32()
            )));
        }
    }

    let mut geofence_helpers = HashMap::new();
    for area in &areas {
        let fence = fences_by_id.get(&area.geofence_included).ok_or_else(|| {
            CoreError::GeofenceMissing {
                area: area.name.clone(),
                geofence: area.geofence_included.to_string(),
            }
        })?;
        let include = parse_geofence_data(fence)?;
        let exclude = match area.geofence_excluded {
            Some(id) => {
                let fence = fences_by_id
                    .get(&id)
                    .ok_or_else(|| CoreError::GeofenceMissing {
                        area: area.name.clone(),
                        geofence: id.to_string(),
                    })?;
                parse_geofence_data(fence)?
            }
            None => Vec::new(),
        };
        let helper = GeofenceHelper::new(include, exclude).ok_or_else(|| {
            CoreError::ConfigInvalid(format!("area {} has an empty geofence", area.name))
        })?;
        geofence_helpers.insert(area.id, helper);
    }

    let calculator = RouteCalculator::new(repos.routecalc.clone());
    let mut route_managers: HashMap<AreaId, Arc<dyn RouteManager>> = HashMap::new();
    for area in &areas {
        let helper = &geofence_helpers[&area.id];
        let seed = seed_coordinates(repos, area, helper).await?;
        let manager = build_route_manager(area, calculator.clone(), seed, helper.centroid());
        route_managers.insert(area.id, manager);
    }

    let mut fsm_areas: HashMap<WalkerId, Vec<_>> = HashMap::new();
    for wa in walker_areas {
        fsm_areas.entry(wa.walker_id).or_default().push(wa);
    }
    let walker_fsms = walkers
        .iter()
        .map(|w| {
            (
                w.id,
                WalkerFsm::new(fsm_areas.remove(&w.id).unwrap_or_default()),
            )
        })
        .collect();

    let pool_settings = devices
        .iter()
        .filter_map(|d| {
            let pool = pools_by_id.get(&d.pool_id?)?;
            Some((d.id, pool.settings.clone()))
        })
        .collect();

    Ok(MappingSnapshot {
        devices: devices.into_iter().map(|d| (d.name.clone(), d)).collect(),
        pool_settings,
        walkers: walkers.into_iter().map(|w| (w.id, w)).collect(),
        walker_fsms,
        areas: areas.into_iter().map(|a| (a.id, a)).collect(),
        geofence_helpers,
        route_managers,
        auths,
    })
}

/// Mode-specific coordinate seeding, fence-filtered.
async fn seed_coordinates(
    repos: &Repositories,
    area: &Area,
    helper: &GeofenceHelper,
) -> Result<Vec<Location>> {
    let bbox = helper.bounding_box();
    let raw = match area.mode {
        AreaMode::Idle | AreaMode::IvMitm => Vec::new(),
        AreaMode::MonMitm => {
            repos
                .observations
                .spawnpoints_in(bbox, area.include_event_id)
                .await?
        }
        AreaMode::RaidsMitm => {
            let mut gyms = repos.observations.gyms_in(bbox).await?;
            if area.including_stops {
                gyms.extend(repos.observations.stops_in(bbox).await?);
            }
            gyms
        }
        AreaMode::Pokestops => repos.observations.stops_in(bbox).await?,
        AreaMode::InitMitm => grid::lattice(&bbox, area.init_grid_level),
    };
    Ok(helper.filter(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryStore;
    use roverd_model::{
        Geofence, GeofenceId, GeofenceKind, WalkerAlgo, WalkerArea,
    };

    fn fence_data() -> String {
        "[test]\n0.0,0.0\n0.0,1.0\n1.0,1.0\n1.0,0.0\n".to_string()
    }

    async fn seeded_repos() -> (Repositories, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        *store.geofences.write() = vec![Geofence {
            id: GeofenceId(1),
            name: "test".to_string(),
            kind: GeofenceKind::Polygon,
            data: fence_data(),
        }];
        *store.areas.write() = vec![Area::for_mode(
            AreaId(1),
            "mon-a",
            AreaMode::MonMitm,
            GeofenceId(1),
        )];
        *store.walkers.write() = vec![Walker {
            id: WalkerId(1),
            name: "w1".to_string(),
        }];
        *store.walker_areas.write() = vec![WalkerArea {
            id: WalkerAreaId(1),
            walker_id: WalkerId(1),
            area_id: AreaId(1),
            algo_type: WalkerAlgo::Coords,
            algo_value: String::new(),
            max_walkers: None,
            order: 0,
        }];
        *store.devices.write() = vec![Device {
            id: DeviceId(1),
            name: "atv01".to_string(),
            walker_id: WalkerId(1),
            pool_id: None,
            settings: DeviceSettings::default(),
        }];
        *store.spawnpoints.write() = vec![
            (Location::new(0.5, 0.5), None),
            (Location::new(0.2, 0.8), None),
            // Outside the fence; must not seed.
            (Location::new(5.0, 5.0), None),
        ];

        let repos = Repositories {
            config: store.clone(),
            auth: store.clone(),
            pogoauth: store.clone(),
            routecalc: store.clone(),
            observations: store.clone(),
            autoconfig: store.clone(),
            apk_blobs: store.clone(),
        };
        (repos, store)
    }

    #[tokio::test]
    async fn snapshot_builds_and_seeds_inside_fence() {
        let (repos, _) = seeded_repos().await;
        let manager = MappingManager::new(repos).await.unwrap();
        manager.start_route_managers().await.unwrap();

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.devices.len(), 1);
        let rm = snapshot.route_manager(AreaId(1)).unwrap();
        assert_eq!(rm.stats().coords_total, 2);
    }

    #[tokio::test]
    async fn missing_geofence_aborts_snapshot() {
        let (repos, store) = seeded_repos().await;
        store.geofences.write().clear();
        let err = MappingManager::new(repos).await.unwrap_err();
        assert!(matches!(err, CoreError::GeofenceMissing { .. }));
    }

    #[tokio::test]
    async fn unknown_walker_reference_aborts_snapshot() {
        let (repos, store) = seeded_repos().await;
        store.devices.write()[0].walker_id = WalkerId(99);
        let err = MappingManager::new(repos).await.unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn reload_with_unchanged_inputs_is_observationally_equal() {
        let (repos, _) = seeded_repos().await;
        let manager = MappingManager::new(repos).await.unwrap();
        manager.start_route_managers().await.unwrap();
        let before = manager.snapshot();

        manager.reload().await.unwrap();
        let after = manager.snapshot();

        assert_eq!(
            before.devices.keys().collect::<Vec<_>>(),
            after.devices.keys().collect::<Vec<_>>()
        );
        assert_eq!(before.areas.len(), after.areas.len());
        assert_eq!(
            before.route_managers[&AreaId(1)].stats().coords_total,
            after.route_managers[&AreaId(1)].stats().coords_total
        );
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let (repos, store) = seeded_repos().await;
        let manager = MappingManager::new(repos).await.unwrap();
        let before = Arc::as_ptr(&manager.snapshot());

        store.geofences.write().clear();
        assert!(manager.reload().await.is_err());
        assert_eq!(Arc::as_ptr(&manager.snapshot()), before);
    }

    #[tokio::test]
    async fn walker_assignment_follows_coords_predicate() {
        let (repos, _) = seeded_repos().await;
        let manager = MappingManager::new(repos).await.unwrap();
        manager.start_route_managers().await.unwrap();

        let (area_id, rm) = manager.next_assignment("atv01").unwrap().unwrap();
        assert_eq!(area_id, AreaId(1));
        assert!(rm.get_next_location("atv01").is_some());
        assert_eq!(manager.transient("atv01").walker_area, Some(WalkerAreaId(1)));
    }

    #[tokio::test]
    async fn queued_settings_reach_the_repository() {
        let (repos, store) = seeded_repos().await;
        let manager = MappingManager::new(repos).await.unwrap();
        manager.queue_setting(DeviceId(1), "walk_speed", "4.5");

        // Let the consumer task run.
        for _ in 0..20 {
            tokio::task::yield_now().await;
            if !store.recorded_setting_writes().is_empty() {
                break;
            }
        }
        let writes = store.recorded_setting_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, "walk_speed");
    }
}
