//! The persisted job log, `update_log.json`. Every mutation rewrites
//! the file through a temp file and rename so a crash never leaves a
//! torn log.

use crate::error::Result;
use parking_lot::Mutex;
use roverd_model::{JobLogEntry, JobStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct JobLog {
    path: PathBuf,
    entries: Mutex<HashMap<String, JobLogEntry>>,
}

impl JobLog {
    /// Open (or create) the log at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<HashMap<String, JobLogEntry>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), %err, "unreadable job log, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        Ok(JobLog {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn get(&self, id: &str) -> Option<JobLogEntry> {
        self.entries.lock().get(id).cloned()
    }

    pub fn all(&self) -> Vec<JobLogEntry> {
        let mut all: Vec<JobLogEntry> = self.entries.lock().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn upsert(&self, entry: JobLogEntry) -> Result<()> {
        self.entries.lock().insert(entry.id.clone(), entry);
        self.persist().await
    }

    pub async fn remove(&self, id: &str) -> Result<Option<JobLogEntry>> {
        let removed = self.entries.lock().remove(id);
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Mark every non-terminal entry as interrupted. Run once at
    /// startup before workers start.
    pub async fn kill_old_jobs(&self) -> Result<Vec<String>> {
        let interrupted: Vec<String> = {
            let mut entries = self.entries.lock();
            entries
                .values_mut()
                .filter(|e| {
                    !e.last_status.is_success()
                        && !matches!(
                            e.last_status,
                            JobStatus::Failed | JobStatus::Cancelled | JobStatus::Interrupted
                        )
                })
                .map(|e| {
                    e.last_status = JobStatus::Interrupted;
                    e.id.clone()
                })
                .collect()
        };
        if !interrupted.is_empty() {
            info!(count = interrupted.len(), "interrupted jobs left over from last run");
            self.persist().await?;
        }
        Ok(interrupted)
    }

    async fn persist(&self) -> Result<()> {
        let snapshot: Value = {
            let entries = self.entries.lock();
            serde_json::to_value(&*entries)?
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
