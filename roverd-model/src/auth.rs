//! HTTP credentials and leasable login accounts.

use crate::ids::{AccountId, AuthId, DeviceId};
use crate::location::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Privilege level of an HTTP basic credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthLevel {
    Public = 1,
    MitmData = 2,
    Admin = 4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    pub id: AuthId,
    pub username: String,
    pub password: String,
    pub level: AuthLevel,
}

impl Auth {
    /// Whether this credential satisfies the required level.
    pub fn permits(&self, required: AuthLevel) -> bool {
        self.level >= required
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginType {
    Google,
    Ptc,
}

/// Why a credential was marked burnt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnType {
    Ban,
    Suspended,
    Maintenance,
}

impl std::str::FromStr for BurnType {
    type Err = crate::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ban" => Ok(BurnType::Ban),
            "suspended" => Ok(BurnType::Suspended),
            "maintenance" => Ok(BurnType::Maintenance),
            other => Err(crate::ModelError::InvalidValue(format!("burn type {other}"))),
        }
    }
}

/// The declared purpose a device leases an account for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountPurpose {
    Quest,
    IvQuest,
    Iv,
    Level,
    MonRaid,
}

/// A leasable login credential. `device_id` set means currently leased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub login_type: LoginType,
    pub username: String,
    pub password: String,
    pub level: u16,
    pub last_burn: Option<DateTime<Utc>>,
    pub last_burn_type: Option<BurnType>,
    pub last_softban_action: Option<DateTime<Utc>>,
    pub last_softban_action_location: Option<Location>,
    pub device_id: Option<DeviceId>,
}

impl Account {
    pub fn unassigned(id: AccountId, login_type: LoginType, username: &str, level: u16) -> Self {
        Account {
            id,
            login_type,
            username: username.to_string(),
            password: String::new(),
            level,
            last_burn: None,
            last_burn_type: None,
            last_softban_action: None,
            last_softban_action_location: None,
            device_id: None,
        }
    }
}
