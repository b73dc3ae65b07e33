//! Postgres adapter for the repository ports.
//!
//! Queries are runtime-checked (`sqlx::query` + manual row mapping) so
//! the crate builds without a live database. All entities are scoped by
//! `instance_id`.

use crate::error::{CoreError, Result};
use crate::persistence::ports::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roverd_model::{
    Account, AccountId, ApkArch, ApkType, Area, AreaId, AreaMode, Auth, AuthId, AuthLevel,
    AutoconfigRegistration, BoundingBox, BurnType, Device, DeviceId, DevicePool, DevicePoolId,
    DeviceSettings, Geofence, GeofenceId, GeofenceKind, InstanceId, Location, LoginType,
    PackageInfo, RecalcStatus, Routecalc, RoutecalcId, RouteCalcAlgorithm, SessionLogLine,
    SessionStatus, Walker, WalkerArea, WalkerAreaId, WalkerId,
    emit_routefile, parse_routefile,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::collections::HashMap;
use std::str::FromStr;

pub struct PostgresStore {
    pool: PgPool,
    instance_id: InstanceId,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl PostgresStore {
    pub fn new(pool: PgPool, instance_id: InstanceId) -> Self {
        Self { pool, instance_id }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn invalid<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> CoreError + '_ {
    move |e| CoreError::ConfigInvalid(format!("{context}: {e}"))
}

fn map_device(row: &PgRow) -> Result<Device> {
    Ok(Device {
        id: DeviceId(row.try_get("device_id")?),
        name: row.try_get("name")?,
        walker_id: WalkerId(row.try_get("walker_id")?),
        pool_id: row
            .try_get::<Option<i32>, _>("pool_id")?
            .map(DevicePoolId),
        settings: DeviceSettings {
            ggl_login_mail: row.try_get("ggl_login_mail")?,
            mitm_wait_timeout: row.try_get("mitm_wait_timeout")?,
            walk_speed: row.try_get("walk_speed")?,
            enhanced_mode_quest: row.try_get("enhanced_mode_quest")?,
            account_rotation_hours: row.try_get("account_rotation_hours")?,
            post_turn_delay: row.try_get("post_turn_delay")?,
        },
    })
}

fn map_area(row: &PgRow) -> Result<Area> {
    let mode: String = row.try_get("mode")?;
    let algorithm: Option<String> = row.try_get("algorithm")?;
    Ok(Area {
        id: AreaId(row.try_get("area_id")?),
        name: row.try_get("name")?,
        mode: AreaMode::from_str(&mode).map_err(invalid("area mode"))?,
        geofence_included: GeofenceId(row.try_get("geofence_included")?),
        geofence_excluded: row
            .try_get::<Option<i32>, _>("geofence_excluded")?
            .map(GeofenceId),
        routecalc_id: row
            .try_get::<Option<i32>, _>("routecalc")?
            .map(RoutecalcId),
        algorithm: match algorithm.as_deref() {
            Some("routefree") => RouteCalcAlgorithm::Routefree,
            _ => RouteCalcAlgorithm::Route,
        },
        speed: row.try_get::<Option<f64>, _>("speed")?.unwrap_or(0.0),
        max_radius: row.try_get::<Option<f64>, _>("max_radius")?.unwrap_or(120.0),
        max_coords_within_radius: row
            .try_get::<Option<i32>, _>("max_coords_within_radius")?
            .unwrap_or(60) as usize,
        delay_after_prio_event: row.try_get("delay_after_prio_event")?,
        priority_queue_clustering_timedelta: row
            .try_get("priority_queue_clustering_timedelta")?,
        remove_from_queue_backlog: row.try_get("remove_from_queue_backlog")?,
        max_clustering: row
            .try_get::<Option<i32>, _>("max_clustering")?
            .unwrap_or(0) as usize,
        starve_route: row
            .try_get::<Option<bool>, _>("starve_route")?
            .unwrap_or(false),
        init: row.try_get::<Option<bool>, _>("init")?.unwrap_or(false),
        init_grid_level: row
            .try_get::<Option<i16>, _>("init_grid_level")?
            .unwrap_or(15) as u8,
        including_stops: row
            .try_get::<Option<bool>, _>("including_stops")?
            .unwrap_or(false),
        level: row.try_get::<Option<bool>, _>("level")?.unwrap_or(false),
        min_time_left_seconds: row.try_get("min_time_left_seconds")?,
        include_event_id: row.try_get("include_event_id")?,
    })
}

fn map_account(row: &PgRow) -> Result<Account> {
    let login_type: String = row.try_get("login_type")?;
    let burn_type: Option<String> = row.try_get("last_burn_type")?;
    let softban_location: Option<String> = row.try_get("last_softban_action_location")?;
    Ok(Account {
        id: AccountId(row.try_get("account_id")?),
        login_type: match login_type.as_str() {
            "google" => LoginType::Google,
            _ => LoginType::Ptc,
        },
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        level: row.try_get::<i16, _>("level")? as u16,
        last_burn: row.try_get("last_burn")?,
        last_burn_type: burn_type
            .as_deref()
            .map(BurnType::from_str)
            .transpose()
            .map_err(invalid("burn type"))?,
        last_softban_action: row.try_get("last_softban_action")?,
        last_softban_action_location: softban_location
            .as_deref()
            .map(Location::from_str)
            .transpose()
            .map_err(invalid("softban location"))?,
        device_id: row.try_get::<Option<i32>, _>("device_id")?.map(DeviceId),
    })
}

#[async_trait]
impl ConfigRepository for PostgresStore {
    async fn devices(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query(
            "SELECT device_id, name, walker_id, pool_id, ggl_login_mail, mitm_wait_timeout, \
             walk_speed, enhanced_mode_quest, account_rotation_hours, post_turn_delay \
             FROM settings_device WHERE instance_id = $1",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_device).collect()
    }

    async fn device_pools(&self) -> Result<Vec<DevicePool>> {
        let rows = sqlx::query(
            "SELECT pool_id, name, ggl_login_mail, mitm_wait_timeout, walk_speed, \
             enhanced_mode_quest, account_rotation_hours, post_turn_delay \
             FROM settings_devicepool WHERE instance_id = $1",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(DevicePool {
                    id: DevicePoolId(row.try_get("pool_id")?),
                    name: row.try_get("name")?,
                    settings: DeviceSettings {
                        ggl_login_mail: row.try_get("ggl_login_mail")?,
                        mitm_wait_timeout: row.try_get("mitm_wait_timeout")?,
                        walk_speed: row.try_get("walk_speed")?,
                        enhanced_mode_quest: row.try_get("enhanced_mode_quest")?,
                        account_rotation_hours: row.try_get("account_rotation_hours")?,
                        post_turn_delay: row.try_get("post_turn_delay")?,
                    },
                })
            })
            .collect()
    }

    async fn walkers(&self) -> Result<Vec<Walker>> {
        let rows = sqlx::query(
            "SELECT walker_id, name FROM settings_walker WHERE instance_id = $1",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Walker {
                    id: WalkerId(row.try_get("walker_id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn walker_areas(&self) -> Result<Vec<WalkerArea>> {
        let rows = sqlx::query(
            "SELECT wa.walkerarea_id, wa.walker_id, wa.area_id, wa.algo_type, wa.algo_value, \
             wa.max_walkers, wa.sort_order \
             FROM settings_walkerarea wa \
             JOIN settings_walker w ON w.walker_id = wa.walker_id \
             WHERE w.instance_id = $1 ORDER BY wa.walker_id, wa.sort_order",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                let algo: String = row.try_get("algo_type")?;
                Ok(WalkerArea {
                    id: WalkerAreaId(row.try_get("walkerarea_id")?),
                    walker_id: WalkerId(row.try_get("walker_id")?),
                    area_id: AreaId(row.try_get("area_id")?),
                    algo_type: algo.parse().map_err(invalid("walker algo"))?,
                    algo_value: row
                        .try_get::<Option<String>, _>("algo_value")?
                        .unwrap_or_default(),
                    max_walkers: row
                        .try_get::<Option<i32>, _>("max_walkers")?
                        .map(|v| v as u32),
                    order: row.try_get("sort_order")?,
                })
            })
            .collect()
    }

    async fn areas(&self) -> Result<Vec<Area>> {
        let rows = sqlx::query(
            "SELECT area_id, name, mode, geofence_included, geofence_excluded, routecalc, \
             algorithm, speed, max_radius, max_coords_within_radius, delay_after_prio_event, \
             priority_queue_clustering_timedelta, remove_from_queue_backlog, max_clustering, \
             starve_route, init, init_grid_level, including_stops, level, \
             min_time_left_seconds, include_event_id \
             FROM settings_area WHERE instance_id = $1",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_area).collect()
    }

    async fn geofences(&self) -> Result<Vec<Geofence>> {
        let rows = sqlx::query(
            "SELECT geofence_id, name, fence_type, fence_data \
             FROM settings_geofence WHERE instance_id = $1",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("fence_type")?;
                Ok(Geofence {
                    id: GeofenceId(row.try_get("geofence_id")?),
                    name: row.try_get("name")?,
                    kind: match kind.as_str() {
                        "geojson" => GeofenceKind::Geojson,
                        _ => GeofenceKind::Polygon,
                    },
                    data: row.try_get("fence_data")?,
                })
            })
            .collect()
    }

    async fn set_device_setting(&self, device: DeviceId, key: &str, value: &str) -> Result<()> {
        // Keys map 1:1 to nullable columns; whitelist them to keep the
        // dynamic column name safe.
        let column = match key {
            "ggl_login_mail" | "walk_speed" | "mitm_wait_timeout" | "enhanced_mode_quest"
            | "account_rotation_hours" | "post_turn_delay" => key,
            _ => {
                return Err(CoreError::ConfigInvalid(format!(
                    "unknown device setting {key}"
                )));
            }
        };
        let query = format!(
            "UPDATE settings_device SET {column} = $1 WHERE device_id = $2 AND instance_id = $3"
        );
        let result = sqlx::query(&query)
            .bind(value)
            .bind(device.as_i32())
            .bind(self.instance_id.as_i32())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("device {device}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthRepository for PostgresStore {
    async fn auths(&self) -> Result<Vec<Auth>> {
        let rows = sqlx::query(
            "SELECT auth_id, username, password, auth_level \
             FROM settings_auth WHERE instance_id = $1",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                let level: i16 = row.try_get("auth_level")?;
                Ok(Auth {
                    id: AuthId(row.try_get("auth_id")?),
                    username: row.try_get("username")?,
                    password: row.try_get("password")?,
                    level: match level {
                        4 => AuthLevel::Admin,
                        2 => AuthLevel::MitmData,
                        _ => AuthLevel::Public,
                    },
                })
            })
            .collect()
    }
}

#[async_trait]
impl PogoauthRepository for PostgresStore {
    async fn accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            "SELECT account_id, login_type, username, password, level, last_burn, \
             last_burn_type, last_softban_action, last_softban_action_location, device_id \
             FROM settings_pogoauth WHERE instance_id = $1",
        )
        .bind(self.instance_id.as_i32())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_account).collect()
    }

    async fn get_assigned_to_device(&self, device: DeviceId) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT account_id, login_type, username, password, level, last_burn, \
             last_burn_type, last_softban_action, last_softban_action_location, device_id \
             FROM settings_pogoauth WHERE instance_id = $1 AND device_id = $2",
        )
        .bind(self.instance_id.as_i32())
        .bind(device.as_i32())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(map_account).transpose()
    }

    async fn lease(&self, account: AccountId, device: DeviceId) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "UPDATE settings_pogoauth SET device_id = NULL \
             WHERE instance_id = $1 AND device_id = $2",
        )
        .bind(self.instance_id.as_i32())
        .bind(device.as_i32())
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query(
            "UPDATE settings_pogoauth SET device_id = $1 \
             WHERE instance_id = $2 AND account_id = $3",
        )
        .bind(device.as_i32())
        .bind(self.instance_id.as_i32())
        .bind(account.as_i32())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("account {account}")));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_assignment(&self, device: DeviceId) -> Result<()> {
        sqlx::query(
            "UPDATE settings_pogoauth SET device_id = NULL \
             WHERE instance_id = $1 AND device_id = $2",
        )
        .bind(self.instance_id.as_i32())
        .bind(device.as_i32())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn mark_burnt(
        &self,
        account: AccountId,
        burn_type: Option<BurnType>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let burn = burn_type.map(|b| match b {
            BurnType::Ban => "ban",
            BurnType::Suspended => "suspended",
            BurnType::Maintenance => "maintenance",
        });
        sqlx::query(
            "UPDATE settings_pogoauth SET last_burn = $1, last_burn_type = $2 \
             WHERE instance_id = $3 AND account_id = $4",
        )
        .bind(at)
        .bind(burn)
        .bind(self.instance_id.as_i32())
        .bind(account.as_i32())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_softban_action(
        &self,
        account: AccountId,
        at: DateTime<Utc>,
        location: Location,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE settings_pogoauth SET last_softban_action = $1, \
             last_softban_action_location = $2 WHERE instance_id = $3 AND account_id = $4",
        )
        .bind(at)
        .bind(location.to_string())
        .bind(self.instance_id.as_i32())
        .bind(account.as_i32())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_level(&self, account: AccountId, level: u16) -> Result<()> {
        sqlx::query(
            "UPDATE settings_pogoauth SET level = $1 WHERE instance_id = $2 AND account_id = $3",
        )
        .bind(level as i16)
        .bind(self.instance_id.as_i32())
        .bind(account.as_i32())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RoutecalcRepository for PostgresStore {
    async fn get(&self, id: RoutecalcId) -> Result<Option<Routecalc>> {
        let row = sqlx::query(
            "SELECT routecalc_id, routefile, recalc_status, last_updated \
             FROM settings_routecalc WHERE instance_id = $1 AND routecalc_id = $2",
        )
        .bind(self.instance_id.as_i32())
        .bind(id.as_i32())
        .fetch_optional(self.pool())
        .await?;
        let Some(row) = row else { return Ok(None) };
        let raw: Option<String> = row.try_get("routefile")?;
        let status: i16 = row.try_get("recalc_status")?;
        Ok(Some(Routecalc {
            id,
            routefile: parse_routefile(raw.as_deref().unwrap_or(""))?,
            recalc_status: if status == 1 {
                RecalcStatus::Running
            } else {
                RecalcStatus::Idle
            },
            last_updated: row.try_get("last_updated")?,
        }))
    }

    async fn transition_status(
        &self,
        id: RoutecalcId,
        from: RecalcStatus,
        to: RecalcStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE settings_routecalc SET recalc_status = $1 \
             WHERE instance_id = $2 AND routecalc_id = $3 AND recalc_status = $4",
        )
        .bind(to as i16)
        .bind(self.instance_id.as_i32())
        .bind(id.as_i32())
        .bind(from as i16)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_route(&self, id: RoutecalcId, route: &[Location]) -> Result<()> {
        sqlx::query(
            "UPDATE settings_routecalc SET routefile = $1, last_updated = $2 \
             WHERE instance_id = $3 AND routecalc_id = $4",
        )
        .bind(emit_routefile(route))
        .bind(Utc::now())
        .bind(self.instance_id.as_i32())
        .bind(id.as_i32())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ObservationRepository for PostgresStore {
    async fn spawnpoints_in(
        &self,
        bbox: BoundingBox,
        event_id: Option<i32>,
    ) -> Result<Vec<Location>> {
        let rows = sqlx::query(
            "SELECT latitude, longitude FROM trs_spawn \
             WHERE latitude BETWEEN $1 AND $2 AND longitude BETWEEN $3 AND $4 \
             AND ($5::int IS NULL OR eventid = $5)",
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .bind(event_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Location::new(
                    row.try_get("latitude")?,
                    row.try_get("longitude")?,
                ))
            })
            .collect()
    }

    async fn gyms_in(&self, bbox: BoundingBox) -> Result<Vec<Location>> {
        let rows = sqlx::query(
            "SELECT latitude, longitude FROM gym \
             WHERE latitude BETWEEN $1 AND $2 AND longitude BETWEEN $3 AND $4",
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Location::new(
                    row.try_get("latitude")?,
                    row.try_get("longitude")?,
                ))
            })
            .collect()
    }

    async fn stops_in(&self, bbox: BoundingBox) -> Result<Vec<Location>> {
        let rows = sqlx::query(
            "SELECT latitude, longitude FROM pokestop \
             WHERE latitude BETWEEN $1 AND $2 AND longitude BETWEEN $3 AND $4",
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Location::new(
                    row.try_get("latitude")?,
                    row.try_get("longitude")?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl AutoconfigRepository for PostgresStore {
    async fn create(&self, registration: AutoconfigRegistration) -> Result<()> {
        sqlx::query(
            "INSERT INTO autoconfig_registration (instance_id, session_id, ip, status) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(self.instance_id.as_i32())
        .bind(registration.session_id)
        .bind(&registration.ip)
        .bind(registration.status as i16)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, session_id: i64) -> Result<Option<AutoconfigRegistration>> {
        let row = sqlx::query(
            "SELECT session_id, device_id, ip, status, mac \
             FROM autoconfig_registration WHERE instance_id = $1 AND session_id = $2",
        )
        .bind(self.instance_id.as_i32())
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        let Some(row) = row else { return Ok(None) };
        let status: i16 = row.try_get("status")?;
        Ok(Some(AutoconfigRegistration {
            session_id: row.try_get("session_id")?,
            device_id: row.try_get::<Option<i32>, _>("device_id")?.map(DeviceId),
            ip: row.try_get("ip")?,
            status: match status {
                1 => SessionStatus::Accepted,
                2 => SessionStatus::Rejected,
                3 => SessionStatus::Review,
                4 => SessionStatus::Failed,
                _ => SessionStatus::Pending,
            },
            mac: row.try_get("mac")?,
        }))
    }

    async fn set_status(&self, session_id: i64, status: SessionStatus) -> Result<()> {
        sqlx::query(
            "UPDATE autoconfig_registration SET status = $1 \
             WHERE instance_id = $2 AND session_id = $3",
        )
        .bind(status as i16)
        .bind(self.instance_id.as_i32())
        .bind(session_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_mac(&self, session_id: i64, mac: &str) -> Result<()> {
        sqlx::query(
            "UPDATE autoconfig_registration SET mac = $1 \
             WHERE instance_id = $2 AND session_id = $3",
        )
        .bind(mac)
        .bind(self.instance_id.as_i32())
        .bind(session_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn assign_device(&self, session_id: i64, device: DeviceId) -> Result<()> {
        sqlx::query(
            "UPDATE autoconfig_registration SET device_id = $1 \
             WHERE instance_id = $2 AND session_id = $3",
        )
        .bind(device.as_i32())
        .bind(self.instance_id.as_i32())
        .bind(session_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn append_log(&self, session_id: i64, line: SessionLogLine) -> Result<()> {
        sqlx::query(
            "INSERT INTO autoconfig_log (instance_id, session_id, level, msg) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(self.instance_id.as_i32())
        .bind(session_id)
        .bind(line.level as i16)
        .bind(&line.message)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn logs(&self, session_id: i64) -> Result<Vec<SessionLogLine>> {
        let rows = sqlx::query(
            "SELECT level, msg FROM autoconfig_log \
             WHERE instance_id = $1 AND session_id = $2 ORDER BY log_id",
        )
        .bind(self.instance_id.as_i32())
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(SessionLogLine {
                    level: row.try_get::<i16, _>("level")? as u8,
                    message: row.try_get("msg")?,
                })
            })
            .collect()
    }

    async fn delete(&self, session_id: i64) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM autoconfig_log WHERE instance_id = $1 AND session_id = $2")
            .bind(self.instance_id.as_i32())
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM autoconfig_registration WHERE instance_id = $1 AND session_id = $2",
        )
        .bind(self.instance_id.as_i32())
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ApkBlobRepository for PostgresStore {
    async fn package_meta(&self, package: ApkType) -> Result<HashMap<ApkArch, PackageInfo>> {
        let rows = sqlx::query(
            "SELECT arch, version, file_name, mimetype, size \
             FROM mad_apk WHERE instance_id = $1 AND package = $2",
        )
        .bind(self.instance_id.as_i32())
        .bind(package.as_str())
        .fetch_all(self.pool())
        .await?;
        let mut meta = HashMap::new();
        for row in &rows {
            let arch: String = row.try_get("arch")?;
            let arch =
                ApkArch::from_str(&arch).map_err(invalid("apk arch"))?;
            meta.insert(
                arch,
                PackageInfo {
                    version: row.try_get("version")?,
                    file_name: row.try_get("file_name")?,
                    mimetype: row.try_get("mimetype")?,
                    size: row.try_get::<i64, _>("size")? as u64,
                    arch,
                },
            );
        }
        Ok(meta)
    }

    async fn replace_package(
        &self,
        package: ApkType,
        arch: ApkArch,
        info: PackageInfo,
        chunks: Vec<Vec<u8>>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM mad_apk_chunk WHERE instance_id = $1 AND package = $2 AND arch = $3")
            .bind(self.instance_id.as_i32())
            .bind(package.as_str())
            .bind(arch.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM mad_apk WHERE instance_id = $1 AND package = $2 AND arch = $3")
            .bind(self.instance_id.as_i32())
            .bind(package.as_str())
            .bind(arch.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO mad_apk (instance_id, package, arch, version, file_name, mimetype, size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(self.instance_id.as_i32())
        .bind(package.as_str())
        .bind(arch.as_str())
        .bind(&info.version)
        .bind(&info.file_name)
        .bind(&info.mimetype)
        .bind(info.size as i64)
        .execute(&mut *tx)
        .await?;
        for (index, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO mad_apk_chunk (instance_id, package, arch, chunk_index, data) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(self.instance_id.as_i32())
            .bind(package.as_str())
            .bind(arch.as_str())
            .bind(index as i32)
            .bind(chunk.as_slice())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn package_chunks(&self, package: ApkType, arch: ApkArch) -> Result<Vec<Vec<u8>>> {
        let rows = sqlx::query(
            "SELECT data FROM mad_apk_chunk \
             WHERE instance_id = $1 AND package = $2 AND arch = $3 ORDER BY chunk_index",
        )
        .bind(self.instance_id.as_i32())
        .bind(package.as_str())
        .bind(arch.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| Ok(row.try_get::<Vec<u8>, _>("data")?))
            .collect()
    }

    async fn delete_package(&self, package: ApkType, arch: ApkArch) -> Result<bool> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM mad_apk_chunk WHERE instance_id = $1 AND package = $2 AND arch = $3")
            .bind(self.instance_id.as_i32())
            .bind(package.as_str())
            .bind(arch.as_str())
            .execute(&mut *tx)
            .await?;
        let result =
            sqlx::query("DELETE FROM mad_apk WHERE instance_id = $1 AND package = $2 AND arch = $3")
                .bind(self.instance_id.as_i32())
                .bind(package.as_str())
                .bind(arch.as_str())
                .execute(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
