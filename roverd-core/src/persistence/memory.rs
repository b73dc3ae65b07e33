//! Process-local adapter implementing every repository port.
//!
//! Used by the test suites and by deployments that run without a
//! relational store. State lives behind parking_lot locks; the async
//! trait methods never block beyond those short critical sections.

use crate::error::{CoreError, Result};
use crate::persistence::ports::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use roverd_model::{
    Account, AccountId, ApkArch, ApkType, Area, Auth, AutoconfigRegistration, BoundingBox,
    BurnType, Device, DeviceId, DevicePool, Geofence, Location, PackageInfo, RecalcStatus,
    Routecalc, RoutecalcId, SessionLogLine, SessionStatus, Walker, WalkerArea,
};
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    pub devices: RwLock<Vec<Device>>,
    pub pools: RwLock<Vec<DevicePool>>,
    pub walkers: RwLock<Vec<Walker>>,
    pub walker_areas: RwLock<Vec<WalkerArea>>,
    pub areas: RwLock<Vec<Area>>,
    pub geofences: RwLock<Vec<Geofence>>,
    pub auths: RwLock<Vec<Auth>>,
    pub accounts: RwLock<Vec<Account>>,
    pub routecalcs: RwLock<HashMap<RoutecalcId, Routecalc>>,
    pub spawnpoints: RwLock<Vec<(Location, Option<i32>)>>,
    pub gyms: RwLock<Vec<Location>>,
    pub stops: RwLock<Vec<Location>>,
    sessions: RwLock<HashMap<i64, AutoconfigRegistration>>,
    session_logs: RwLock<HashMap<i64, Vec<SessionLogLine>>>,
    apk_meta: RwLock<HashMap<(ApkType, ApkArch), PackageInfo>>,
    apk_chunks: RwLock<HashMap<(ApkType, ApkArch), Vec<Vec<u8>>>>,
    setting_writes: RwLock<Vec<(DeviceId, String, String)>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Writes recorded via the setter queue, in application order.
    pub fn recorded_setting_writes(&self) -> Vec<(DeviceId, String, String)> {
        self.setting_writes.read().clone()
    }
}

#[async_trait]
impl ConfigRepository for MemoryStore {
    async fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.read().clone())
    }

    async fn device_pools(&self) -> Result<Vec<DevicePool>> {
        Ok(self.pools.read().clone())
    }

    async fn walkers(&self) -> Result<Vec<Walker>> {
        Ok(self.walkers.read().clone())
    }

    async fn walker_areas(&self) -> Result<Vec<WalkerArea>> {
        Ok(self.walker_areas.read().clone())
    }

    async fn areas(&self) -> Result<Vec<Area>> {
        Ok(self.areas.read().clone())
    }

    async fn geofences(&self) -> Result<Vec<Geofence>> {
        Ok(self.geofences.read().clone())
    }

    async fn set_device_setting(&self, device: DeviceId, key: &str, value: &str) -> Result<()> {
        let mut devices = self.devices.write();
        let entry = devices
            .iter_mut()
            .find(|d| d.id == device)
            .ok_or_else(|| CoreError::NotFound(format!("device {device}")))?;
        match key {
            "ggl_login_mail" => entry.settings.ggl_login_mail = Some(value.to_string()),
            "walk_speed" => {
                entry.settings.walk_speed = Some(value.parse().map_err(|_| {
                    CoreError::ConfigInvalid(format!("walk_speed value {value}"))
                })?)
            }
            "mitm_wait_timeout" => {
                entry.settings.mitm_wait_timeout = Some(value.parse().map_err(|_| {
                    CoreError::ConfigInvalid(format!("mitm_wait_timeout value {value}"))
                })?)
            }
            _ => {
                return Err(CoreError::ConfigInvalid(format!(
                    "unknown device setting {key}"
                )));
            }
        }
        self.setting_writes
            .write()
            .push((device, key.to_string(), value.to_string()));
        Ok(())
    }
}

#[async_trait]
impl AuthRepository for MemoryStore {
    async fn auths(&self) -> Result<Vec<Auth>> {
        Ok(self.auths.read().clone())
    }
}

#[async_trait]
impl PogoauthRepository for MemoryStore {
    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.read().clone())
    }

    async fn get_assigned_to_device(&self, device: DeviceId) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .iter()
            .find(|a| a.device_id == Some(device))
            .cloned())
    }

    async fn lease(&self, account: AccountId, device: DeviceId) -> Result<()> {
        let mut accounts = self.accounts.write();
        for entry in accounts.iter_mut() {
            if entry.device_id == Some(device) {
                entry.device_id = None;
            }
        }
        let entry = accounts
            .iter_mut()
            .find(|a| a.id == account)
            .ok_or_else(|| CoreError::NotFound(format!("account {account}")))?;
        entry.device_id = Some(device);
        Ok(())
    }

    async fn clear_assignment(&self, device: DeviceId) -> Result<()> {
        let mut accounts = self.accounts.write();
        for entry in accounts.iter_mut() {
            if entry.device_id == Some(device) {
                entry.device_id = None;
            }
        }
        Ok(())
    }

    async fn mark_burnt(
        &self,
        account: AccountId,
        burn_type: Option<BurnType>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut accounts = self.accounts.write();
        let entry = accounts
            .iter_mut()
            .find(|a| a.id == account)
            .ok_or_else(|| CoreError::NotFound(format!("account {account}")))?;
        entry.last_burn = Some(at);
        entry.last_burn_type = burn_type;
        Ok(())
    }

    async fn set_softban_action(
        &self,
        account: AccountId,
        at: DateTime<Utc>,
        location: Location,
    ) -> Result<()> {
        let mut accounts = self.accounts.write();
        let entry = accounts
            .iter_mut()
            .find(|a| a.id == account)
            .ok_or_else(|| CoreError::NotFound(format!("account {account}")))?;
        entry.last_softban_action = Some(at);
        entry.last_softban_action_location = Some(location);
        Ok(())
    }

    async fn set_level(&self, account: AccountId, level: u16) -> Result<()> {
        let mut accounts = self.accounts.write();
        let entry = accounts
            .iter_mut()
            .find(|a| a.id == account)
            .ok_or_else(|| CoreError::NotFound(format!("account {account}")))?;
        entry.level = level;
        Ok(())
    }
}

#[async_trait]
impl RoutecalcRepository for MemoryStore {
    async fn get(&self, id: RoutecalcId) -> Result<Option<Routecalc>> {
        Ok(self.routecalcs.read().get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: RoutecalcId,
        from: RecalcStatus,
        to: RecalcStatus,
    ) -> Result<bool> {
        let mut calcs = self.routecalcs.write();
        let entry = calcs.entry(id).or_insert_with(|| Routecalc {
            id,
            routefile: Vec::new(),
            recalc_status: RecalcStatus::Idle,
            last_updated: None,
        });
        if entry.recalc_status != from {
            return Ok(false);
        }
        entry.recalc_status = to;
        Ok(true)
    }

    async fn save_route(&self, id: RoutecalcId, route: &[Location]) -> Result<()> {
        let mut calcs = self.routecalcs.write();
        let entry = calcs.entry(id).or_insert_with(|| Routecalc {
            id,
            routefile: Vec::new(),
            recalc_status: RecalcStatus::Idle,
            last_updated: None,
        });
        entry.routefile = route.to_vec();
        entry.last_updated = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ObservationRepository for MemoryStore {
    async fn spawnpoints_in(
        &self,
        bbox: BoundingBox,
        event_id: Option<i32>,
    ) -> Result<Vec<Location>> {
        Ok(self
            .spawnpoints
            .read()
            .iter()
            .filter(|(loc, event)| {
                bbox.contains(loc) && (event_id.is_none() || *event == event_id)
            })
            .map(|(loc, _)| *loc)
            .collect())
    }

    async fn gyms_in(&self, bbox: BoundingBox) -> Result<Vec<Location>> {
        Ok(self
            .gyms
            .read()
            .iter()
            .filter(|loc| bbox.contains(loc))
            .copied()
            .collect())
    }

    async fn stops_in(&self, bbox: BoundingBox) -> Result<Vec<Location>> {
        Ok(self
            .stops
            .read()
            .iter()
            .filter(|loc| bbox.contains(loc))
            .copied()
            .collect())
    }
}

#[async_trait]
impl AutoconfigRepository for MemoryStore {
    async fn create(&self, registration: AutoconfigRegistration) -> Result<()> {
        self.sessions
            .write()
            .insert(registration.session_id, registration);
        Ok(())
    }

    async fn get(&self, session_id: i64) -> Result<Option<AutoconfigRegistration>> {
        Ok(self.sessions.read().get(&session_id).cloned())
    }

    async fn set_status(&self, session_id: i64, status: SessionStatus) -> Result<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))?;
        entry.status = status;
        Ok(())
    }

    async fn set_mac(&self, session_id: i64, mac: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))?;
        entry.mac = Some(mac.to_string());
        Ok(())
    }

    async fn assign_device(&self, session_id: i64, device: DeviceId) -> Result<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))?;
        entry.device_id = Some(device);
        Ok(())
    }

    async fn append_log(&self, session_id: i64, line: SessionLogLine) -> Result<()> {
        self.session_logs
            .write()
            .entry(session_id)
            .or_default()
            .push(line);
        Ok(())
    }

    async fn logs(&self, session_id: i64) -> Result<Vec<SessionLogLine>> {
        Ok(self
            .session_logs
            .read()
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, session_id: i64) -> Result<()> {
        self.sessions.write().remove(&session_id);
        self.session_logs.write().remove(&session_id);
        Ok(())
    }
}

#[async_trait]
impl ApkBlobRepository for MemoryStore {
    async fn package_meta(&self, package: ApkType) -> Result<HashMap<ApkArch, PackageInfo>> {
        Ok(self
            .apk_meta
            .read()
            .iter()
            .filter(|((p, _), _)| *p == package)
            .map(|((_, arch), info)| (*arch, info.clone()))
            .collect())
    }

    async fn replace_package(
        &self,
        package: ApkType,
        arch: ApkArch,
        info: PackageInfo,
        chunks: Vec<Vec<u8>>,
    ) -> Result<()> {
        self.apk_meta.write().insert((package, arch), info);
        self.apk_chunks.write().insert((package, arch), chunks);
        Ok(())
    }

    async fn package_chunks(&self, package: ApkType, arch: ApkArch) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .apk_chunks
            .read()
            .get(&(package, arch))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_package(&self, package: ApkType, arch: ApkArch) -> Result<bool> {
        let had_meta = self.apk_meta.write().remove(&(package, arch)).is_some();
        self.apk_chunks.write().remove(&(package, arch));
        Ok(had_meta)
    }
}
