//! Repository traits the core consumes. The relational store itself is
//! an external collaborator; adapters live next door.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roverd_model::{
    Account, AccountId, ApkArch, ApkType, Area, Auth, AutoconfigRegistration, BoundingBox,
    BurnType, Device, DeviceId, DevicePool, Geofence, Location, PackageInfo, RecalcStatus,
    Routecalc, RoutecalcId, SessionLogLine, SessionStatus, Walker, WalkerArea,
};
use std::collections::HashMap;

/// Read access to the operator-maintained configuration entities. The
/// mapping manager reads them in one logical pass when building a
/// snapshot.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn devices(&self) -> Result<Vec<Device>>;
    async fn device_pools(&self) -> Result<Vec<DevicePool>>;
    async fn walkers(&self) -> Result<Vec<Walker>>;
    async fn walker_areas(&self) -> Result<Vec<WalkerArea>>;
    async fn areas(&self) -> Result<Vec<Area>>;
    async fn geofences(&self) -> Result<Vec<Geofence>>;

    /// Apply one serialized device-setting write (the setter queue's
    /// consumer calls this).
    async fn set_device_setting(&self, device: DeviceId, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn auths(&self) -> Result<Vec<Auth>>;
}

/// Leasable credential rows. Mutations preserve the invariant that no
/// two rows of an instance carry the same non-null `device_id`; the
/// lender serializes them under its instance lock.
#[async_trait]
pub trait PogoauthRepository: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Account>>;
    async fn get_assigned_to_device(&self, device: DeviceId) -> Result<Option<Account>>;

    /// Clear any row currently assigned to `device` and assign
    /// `account` to it in one transaction.
    async fn lease(&self, account: AccountId, device: DeviceId) -> Result<()>;
    async fn clear_assignment(&self, device: DeviceId) -> Result<()>;

    async fn mark_burnt(
        &self,
        account: AccountId,
        burn_type: Option<BurnType>,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn set_softban_action(
        &self,
        account: AccountId,
        at: DateTime<Utc>,
        location: Location,
    ) -> Result<()>;
    async fn set_level(&self, account: AccountId, level: u16) -> Result<()>;
}

#[async_trait]
pub trait RoutecalcRepository: Send + Sync {
    async fn get(&self, id: RoutecalcId) -> Result<Option<Routecalc>>;

    /// Compare-and-set the recalc status; returns false when the row
    /// already carried `to` (used to reject concurrent recalcs).
    async fn transition_status(
        &self,
        id: RoutecalcId,
        from: RecalcStatus,
        to: RecalcStatus,
    ) -> Result<bool>;

    /// Persist a freshly calculated route and stamp `last_updated`.
    async fn save_route(&self, id: RoutecalcId, route: &[Location]) -> Result<()>;
}

/// Coordinate seeding reads. Callers pre-filter with the fence bounding
/// box; exact containment is checked by the geofence engine afterwards.
#[async_trait]
pub trait ObservationRepository: Send + Sync {
    async fn spawnpoints_in(
        &self,
        bbox: BoundingBox,
        event_id: Option<i32>,
    ) -> Result<Vec<Location>>;
    async fn gyms_in(&self, bbox: BoundingBox) -> Result<Vec<Location>>;
    async fn stops_in(&self, bbox: BoundingBox) -> Result<Vec<Location>>;
}

#[async_trait]
pub trait AutoconfigRepository: Send + Sync {
    async fn create(&self, registration: AutoconfigRegistration) -> Result<()>;
    async fn get(&self, session_id: i64) -> Result<Option<AutoconfigRegistration>>;
    async fn set_status(&self, session_id: i64, status: SessionStatus) -> Result<()>;
    async fn set_mac(&self, session_id: i64, mac: &str) -> Result<()>;
    async fn assign_device(&self, session_id: i64, device: DeviceId) -> Result<()>;
    async fn append_log(&self, session_id: i64, line: SessionLogLine) -> Result<()>;
    async fn logs(&self, session_id: i64) -> Result<Vec<SessionLogLine>>;
    async fn delete(&self, session_id: i64) -> Result<()>;
}

/// Chunked binary package storage for the database-backed blob
/// repository variant.
#[async_trait]
pub trait ApkBlobRepository: Send + Sync {
    async fn package_meta(&self, package: ApkType) -> Result<HashMap<ApkArch, PackageInfo>>;

    /// Replace the row for `(package, arch)`: metadata plus data chunks.
    async fn replace_package(
        &self,
        package: ApkType,
        arch: ApkArch,
        info: PackageInfo,
        chunks: Vec<Vec<u8>>,
    ) -> Result<()>;
    async fn package_chunks(&self, package: ApkType, arch: ApkArch) -> Result<Vec<Vec<u8>>>;
    async fn delete_package(&self, package: ApkType, arch: ApkArch) -> Result<bool>;
}
