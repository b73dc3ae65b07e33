//! Device onboarding sessions.

use crate::ids::DeviceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending = 0,
    Accepted = 1,
    Rejected = 2,
    /// Operator hold; returns to pending on release.
    Review = 3,
    /// Terminal; set when a session log line of level >= 4 arrives.
    Failed = 4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoconfigRegistration {
    pub session_id: i64,
    pub device_id: Option<DeviceId>,
    pub ip: String,
    pub status: SessionStatus,
    pub mac: Option<String>,
}

/// One log line appended by the onboarding device: `level,message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogLine {
    pub level: u8,
    pub message: String,
}

impl std::str::FromStr for SessionLogLine {
    type Err = crate::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, message) = s
            .split_once(',')
            .ok_or_else(|| crate::ModelError::InvalidValue(format!("log line {s}")))?;
        Ok(SessionLogLine {
            level: level
                .trim()
                .parse()
                .map_err(|_| crate::ModelError::InvalidValue(format!("log level in {s}")))?,
            message: message.to_string(),
        })
    }
}
