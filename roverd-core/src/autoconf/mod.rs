//! Device onboarding sessions: registration, operator decision, log
//! collection and completion.

use crate::error::{CoreError, Result};
use crate::persistence::ports::AutoconfigRepository;
use rand::Rng;
use roverd_model::{AutoconfigRegistration, DeviceId, SessionLogLine, SessionStatus};
use std::sync::Arc;
use tracing::{info, warn};

/// Log level at or above which a session is considered failed.
pub const SESSION_FAIL_LEVEL: u8 = 4;

pub struct AutoconfManager {
    repo: Arc<dyn AutoconfigRepository>,
}

impl AutoconfManager {
    pub fn new(repo: Arc<dyn AutoconfigRepository>) -> Self {
        AutoconfManager { repo }
    }

    /// Open a new pending session for a device calling in from `ip`.
    pub async fn register(&self, ip: &str) -> Result<i64> {
        let session_id: i64 = rand::rng().random_range(1..i64::MAX);
        let registration = AutoconfigRegistration {
            session_id,
            device_id: None,
            ip: ip.to_string(),
            status: SessionStatus::Pending,
            mac: None,
        };
        self.repo.create(registration).await?;
        info!(session_id, ip, "autoconfig session registered");
        Ok(session_id)
    }

    pub async fn get(&self, session_id: i64) -> Result<AutoconfigRegistration> {
        self.repo
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("autoconfig session {session_id}")))
    }

    /// Operator decision. Accepting requires a device assignment so the
    /// session can be turned into an origin.
    pub async fn set_status(
        &self,
        session_id: i64,
        status: SessionStatus,
        device: Option<DeviceId>,
    ) -> Result<()> {
        self.get(session_id).await?;
        if status == SessionStatus::Accepted {
            let device = device.ok_or_else(|| {
                CoreError::ConfigInvalid("accepting a session requires a device".to_string())
            })?;
            self.repo.assign_device(session_id, device).await?;
        }
        self.repo.set_status(session_id, status).await
    }

    pub async fn set_mac(&self, session_id: i64, mac: &str) -> Result<()> {
        self.get(session_id).await?;
        self.repo.set_mac(session_id, mac).await
    }

    pub async fn mac(&self, session_id: i64) -> Result<Option<String>> {
        Ok(self.get(session_id).await?.mac)
    }

    /// Append a `level,message` line; a line at or above
    /// [`SESSION_FAIL_LEVEL`] flips the session to failed.
    pub async fn append_log(&self, session_id: i64, line: SessionLogLine) -> Result<()> {
        self.get(session_id).await?;
        let failing = line.level >= SESSION_FAIL_LEVEL;
        if failing {
            warn!(session_id, level = line.level, message = %line.message, "session log error");
        }
        self.repo.append_log(session_id, line).await?;
        if failing {
            self.repo
                .set_status(session_id, SessionStatus::Failed)
                .await?;
        }
        Ok(())
    }

    pub async fn logs(&self, session_id: i64) -> Result<Vec<SessionLogLine>> {
        self.repo.logs(session_id).await
    }

    /// Terminate the session. Refused while any log line recorded an
    /// error-level event, so operators can inspect the failure.
    pub async fn complete(&self, session_id: i64) -> Result<()> {
        let registration = self.get(session_id).await?;
        let failed = registration.status == SessionStatus::Failed
            || self
                .logs(session_id)
                .await?
                .iter()
                .any(|line| line.level >= SESSION_FAIL_LEVEL);
        if failed {
            return Err(CoreError::SessionFailed(format!(
                "session {session_id} logged errors"
            )));
        }
        self.repo.delete(session_id).await?;
        info!(session_id, "autoconfig session completed");
        Ok(())
    }
}
