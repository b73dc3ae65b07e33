//! Administrative job chains executed against devices.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubJobType {
    Installation,
    SmartUpdate,
    Reboot,
    Restart,
    Stop,
    Start,
    Passthrough,
    /// Expands to the referenced job's sub-jobs at enqueue time.
    Chain,
}

/// One step of a job chain, loaded from the sub-job catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubJob {
    #[serde(rename = "TYPE")]
    pub job_type: SubJobType,
    /// Type-specific argument: file name, package, shell string or
    /// chained job name.
    #[serde(rename = "SYNTAX", default)]
    pub syntax: String,
    #[serde(rename = "FIELDNAME", default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    /// Minutes to wait before this step may run.
    #[serde(rename = "WAITTIME", default, skip_serializing_if = "Option::is_none")]
    pub waittime: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Starting,
    Processing,
    Success,
    Failing,
    Failed,
    NotConnected,
    Future,
    NotRequired,
    NotSupported,
    Cancelled,
    Interrupted,
}

impl JobStatus {
    /// States a finished chain may legitimately end in.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::NotRequired | JobStatus::NotSupported
        )
    }
}

/// Recurrence algorithm of an auto-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAlgo {
    /// `algo_value` = minutes between runs.
    Loop,
    /// `algo_value` = `HH:MM` wall-clock time of the next run.
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoCommandSettings {
    pub algo_type: JobAlgo,
    pub algo_value: String,
    #[serde(default)]
    pub redo: bool,
    #[serde(default)]
    pub redo_on_error: bool,
}

/// Auto-command descriptor as loaded from the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCommand {
    pub origins: Vec<String>,
    pub job: String,
    pub algo_type: JobAlgo,
    pub algo_value: String,
    #[serde(default)]
    pub start_with_init: bool,
    #[serde(default)]
    pub redo: bool,
    #[serde(default)]
    pub redo_on_error: bool,
}

/// One entry of the global job log; the unit the updater queue carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: String,
    pub origin: String,
    pub job_name: String,
    pub sub_jobs: Vec<SubJob>,
    #[serde(default)]
    pub sub_job_index: usize,
    pub last_status: JobStatus,
    /// Consecutive attempts of the current sub-job.
    #[serde(default)]
    pub counter: u32,
    /// Unix seconds before which the job must not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_command_settings: Option<AutoCommandSettings>,
    /// Trimmed passthrough response of the last executed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<String>,
}

impl JobLogEntry {
    pub fn new(id: String, origin: String, job_name: String, sub_jobs: Vec<SubJob>) -> Self {
        JobLogEntry {
            id,
            origin,
            job_name,
            sub_jobs,
            sub_job_index: 0,
            last_status: JobStatus::Pending,
            counter: 0,
            processing_date: None,
            auto_command_settings: None,
            returning: None,
        }
    }
}
