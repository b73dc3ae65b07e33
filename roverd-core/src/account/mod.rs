//! The account lender: mutually-exclusive leasing of login credentials
//! to devices, with burn and softban-cooldown rules.

use crate::error::Result;
use crate::persistence::ports::PogoauthRepository;
use chrono::{DateTime, Duration, Utc};
use roverd_model::{Account, AccountId, AccountPurpose, BurnType, DeviceId, Location};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Minimum account level to scan encounters.
pub const MIN_LEVEL_IV: u16 = 30;
/// Minimum account level to see raids.
pub const MIN_LEVEL_RAID: u16 = 5;
/// Hours an account stays burnt after a maintenance screen.
pub const MAINTENANCE_COOLDOWN_HOURS: i64 = 24;
/// Days an account stays burnt after a suspension notice.
pub const SUSPENSION_COOLDOWN_DAYS: i64 = 7;
/// Upper bound on the softban travel cooldown.
pub const COOLDOWN_MAX_SECONDS: i64 = 7200;

const DEFAULT_WALK_SPEED_MPS: f64 = 16.67;

/// Seconds an account must rest after a softban action before acting
/// at `distance_m` metres away. Monotone in distance.
pub fn cooldown_seconds(distance_m: f64, walk_speed_mps: f64) -> i64 {
    let speed = if walk_speed_mps > 0.0 {
        walk_speed_mps
    } else {
        DEFAULT_WALK_SPEED_MPS
    };
    let seconds = (distance_m / speed).ceil() as i64;
    seconds.clamp(0, COOLDOWN_MAX_SECONDS)
}

fn is_burnt(account: &Account, now: DateTime<Utc>) -> bool {
    let Some(burn_type) = account.last_burn_type else {
        return false;
    };
    match burn_type {
        BurnType::Ban => true,
        BurnType::Suspended => account
            .last_burn
            .is_some_and(|at| at + Duration::days(SUSPENSION_COOLDOWN_DAYS) > now),
        BurnType::Maintenance => account
            .last_burn
            .is_some_and(|at| at + Duration::hours(MAINTENANCE_COOLDOWN_HOURS) > now),
    }
}

fn fits_purpose(account: &Account, purpose: AccountPurpose) -> bool {
    match purpose {
        AccountPurpose::MonRaid => account.level >= MIN_LEVEL_RAID,
        AccountPurpose::Iv | AccountPurpose::IvQuest => account.level >= MIN_LEVEL_IV,
        AccountPurpose::Level => account.level < MIN_LEVEL_IV,
        AccountPurpose::Quest => true,
    }
}

/// Purposes whose actions trigger softbans and therefore respect the
/// travel cooldown.
fn respects_softban(purpose: AccountPurpose) -> bool {
    matches!(
        purpose,
        AccountPurpose::Quest | AccountPurpose::IvQuest | AccountPurpose::Level
    )
}

fn softban_cooled_down(
    account: &Account,
    purpose: AccountPurpose,
    target: Option<Location>,
    walk_speed_mps: f64,
    now: DateTime<Utc>,
) -> bool {
    if !respects_softban(purpose) {
        return true;
    }
    let (Some(at), Some(from)) = (account.last_softban_action, account.last_softban_action_location)
    else {
        return true;
    };
    let Some(target) = target else {
        return true;
    };
    let wait = cooldown_seconds(from.distance_m(&target), walk_speed_mps);
    now > at + Duration::seconds(wait)
}

/// Leases accounts to devices. All mutations run under a single lock
/// so no two devices race for the same row.
pub struct AccountLender {
    repo: Arc<dyn PogoauthRepository>,
    lease_lock: Mutex<()>,
}

impl AccountLender {
    pub fn new(repo: Arc<dyn PogoauthRepository>) -> Self {
        AccountLender {
            repo,
            lease_lock: Mutex::new(()),
        }
    }

    /// Lease the best-fitting account to `device` for `purpose`.
    /// `target` is where the device will act next; `ggl_login_mail` is
    /// the device's accepted google mail list (empty = any).
    ///
    /// Returns None when no account satisfies purpose and cooldown.
    pub async fn get_account(
        &self,
        device: DeviceId,
        origin: &str,
        purpose: AccountPurpose,
        target: Option<Location>,
        walk_speed_mps: f64,
        ggl_login_mail: &[String],
    ) -> Result<Option<Account>> {
        let _guard = self.lease_lock.lock().await;
        let now = Utc::now();

        let mut candidates: Vec<Account> = self
            .repo
            .accounts()
            .await?
            .into_iter()
            .filter(|a| a.device_id.is_none() || a.device_id == Some(device))
            .filter(|a| !is_burnt(a, now))
            .filter(|a| fits_purpose(a, purpose))
            .filter(|a| softban_cooled_down(a, purpose, target, walk_speed_mps, now))
            .collect();

        if candidates.is_empty() {
            warn!(origin, purpose = ?purpose, "no account satisfies purpose and cooldown");
            return Ok(None);
        }

        // Oldest burn first; never-burnt rows lead.
        candidates.sort_by_key(|a| (a.last_burn.is_some(), a.last_burn, a.id.as_i32()));

        let chosen = candidates
            .iter()
            .find(|a| !ggl_login_mail.is_empty() && ggl_login_mail.contains(&a.username))
            .or_else(|| candidates.first())
            .cloned();

        let Some(account) = chosen else {
            return Ok(None);
        };
        self.repo.lease(account.id, device).await?;
        info!(origin, username = %account.username, "leased account");
        Ok(Some(Account {
            device_id: Some(device),
            ..account
        }))
    }

    /// Burn the device's currently-assigned account.
    pub async fn mark_burnt(&self, device: DeviceId, burn_type: Option<BurnType>) -> Result<()> {
        let _guard = self.lease_lock.lock().await;
        let Some(account) = self.repo.get_assigned_to_device(device).await? else {
            debug!(device = device.as_i32(), "mark_burnt without an assigned account");
            return Ok(());
        };
        self.repo.mark_burnt(account.id, burn_type, Utc::now()).await
    }

    pub async fn set_last_softban_action(
        &self,
        device: DeviceId,
        at: DateTime<Utc>,
        location: Location,
    ) -> Result<()> {
        let _guard = self.lease_lock.lock().await;
        let Some(account) = self.repo.get_assigned_to_device(device).await? else {
            return Ok(());
        };
        self.repo.set_softban_action(account.id, at, location).await
    }

    /// Release the device's assigned account.
    pub async fn notify_logout(&self, device: DeviceId) -> Result<()> {
        let _guard = self.lease_lock.lock().await;
        self.repo.clear_assignment(device).await
    }

    pub async fn get_assigned_username(&self, device: DeviceId) -> Result<Option<String>> {
        Ok(self
            .repo
            .get_assigned_to_device(device)
            .await?
            .map(|a| a.username))
    }

    /// Record a level observed in telemetry on the assigned account.
    pub async fn set_level(&self, device: DeviceId, level: u16) -> Result<()> {
        let Some(account) = self.repo.get_assigned_to_device(device).await? else {
            return Ok(());
        };
        if account.level == level {
            return Ok(());
        }
        self.repo.set_level(account.id, level).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryStore;
    use roverd_model::LoginType;

    fn lender_with(accounts: Vec<Account>) -> (AccountLender, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        *store.accounts.write() = accounts;
        (AccountLender::new(store.clone()), store)
    }

    fn account(id: i32, level: u16) -> Account {
        Account::unassigned(AccountId(id), LoginType::Ptc, &format!("acc{id}"), level)
    }

    #[test]
    fn cooldown_is_monotone_in_distance() {
        let mut last = 0;
        for km in [0.0, 1.0, 5.0, 10.0, 50.0, 500.0] {
            let s = cooldown_seconds(km * 1000.0, 16.67);
            assert!(s >= last);
            last = s;
        }
        assert_eq!(cooldown_seconds(1e9, 16.67), COOLDOWN_MAX_SECONDS);
    }

    #[tokio::test]
    async fn lease_is_exclusive_and_logout_releases() {
        let (lender, store) = lender_with(vec![account(1, 30)]);
        let leased = lender
            .get_account(DeviceId(7), "d1", AccountPurpose::Quest, None, 0.0, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.device_id, Some(DeviceId(7)));
        assert_eq!(store.accounts.read()[0].device_id, Some(DeviceId(7)));

        // A second device cannot take the same row.
        let other = lender
            .get_account(DeviceId(8), "d2", AccountPurpose::Quest, None, 0.0, &[])
            .await
            .unwrap();
        assert!(other.is_none());

        lender.notify_logout(DeviceId(7)).await.unwrap();
        assert_eq!(store.accounts.read()[0].device_id, None);
    }

    #[tokio::test]
    async fn burnt_accounts_are_filtered() {
        let now = Utc::now();
        let mut banned = account(1, 30);
        banned.last_burn = Some(now - Duration::days(365));
        banned.last_burn_type = Some(BurnType::Ban);
        let mut maintenance = account(2, 30);
        maintenance.last_burn = Some(now - Duration::hours(1));
        maintenance.last_burn_type = Some(BurnType::Maintenance);
        let mut recovered = account(3, 30);
        recovered.last_burn = Some(now - Duration::hours(MAINTENANCE_COOLDOWN_HOURS + 1));
        recovered.last_burn_type = Some(BurnType::Maintenance);

        let (lender, _) = lender_with(vec![banned, maintenance, recovered]);
        let leased = lender
            .get_account(DeviceId(1), "d1", AccountPurpose::Quest, None, 0.0, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.id, AccountId(3));
    }

    #[tokio::test]
    async fn purpose_fitness_gates_on_level() {
        let (lender, _) = lender_with(vec![account(1, 10), account(2, 35)]);

        let iv = lender
            .get_account(DeviceId(1), "d1", AccountPurpose::Iv, None, 0.0, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(iv.id, AccountId(2));
        lender.notify_logout(DeviceId(1)).await.unwrap();

        let leveling = lender
            .get_account(DeviceId(1), "d1", AccountPurpose::Level, None, 0.0, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leveling.id, AccountId(1));
    }

    #[tokio::test]
    async fn softban_cooldown_denies_then_grants() {
        // 10 km at 16.67 m/s is a 600 second cooldown: denied at
        // +500s, granted at +700s.
        let origin_loc = Location::new(0.0, 0.0);
        let target = Location::new(0.0, 10_000.0 / 111_194.9);
        let softban_at = Utc::now() - Duration::seconds(500);

        let mut acc = account(1, 30);
        acc.last_softban_action = Some(softban_at);
        acc.last_softban_action_location = Some(origin_loc);
        let (lender, store) = lender_with(vec![acc]);

        let denied = lender
            .get_account(DeviceId(1), "d1", AccountPurpose::Quest, Some(target), 16.67, &[])
            .await
            .unwrap();
        assert!(denied.is_none());

        store.accounts.write()[0].last_softban_action = Some(Utc::now() - Duration::seconds(700));
        let granted = lender
            .get_account(DeviceId(1), "d1", AccountPurpose::Quest, Some(target), 16.67, &[])
            .await
            .unwrap();
        assert!(granted.is_some());
    }

    #[tokio::test]
    async fn google_mail_fast_path_wins_over_burn_order() {
        let (lender, _) = lender_with(vec![account(1, 30), account(2, 30)]);
        let leased = lender
            .get_account(
                DeviceId(1),
                "d1",
                AccountPurpose::Quest,
                None,
                0.0,
                &["acc2".to_string()],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.id, AccountId(2));
    }

    #[tokio::test]
    async fn oldest_burn_leads_with_never_burnt_first() {
        let now = Utc::now();
        let mut old = account(1, 30);
        old.last_burn = Some(now - Duration::days(30));
        let mut recent = account(2, 30);
        recent.last_burn = Some(now - Duration::days(10));
        let fresh = account(3, 30);

        let (lender, _) = lender_with(vec![recent, old, fresh]);
        let leased = lender
            .get_account(DeviceId(1), "d1", AccountPurpose::Quest, None, 0.0, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.id, AccountId(3));
    }

    #[tokio::test]
    async fn mark_burnt_stamps_assigned_row() {
        let (lender, store) = lender_with(vec![account(1, 30)]);
        lender
            .get_account(DeviceId(1), "d1", AccountPurpose::Quest, None, 0.0, &[])
            .await
            .unwrap();
        lender
            .mark_burnt(DeviceId(1), Some(BurnType::Suspended))
            .await
            .unwrap();
        let row = store.accounts.read()[0].clone();
        assert_eq!(row.last_burn_type, Some(BurnType::Suspended));
        assert!(row.last_burn.is_some());
    }
}
