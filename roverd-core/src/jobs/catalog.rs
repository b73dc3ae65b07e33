//! The sub-job catalog and auto-command descriptors, loaded from JSON
//! configuration files.

use crate::error::{CoreError, Result};
use roverd_model::{AutoCommand, SubJob, SubJobType};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Named job chains. Chains referencing other chains are flattened at
/// resolution time.
#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    jobs: HashMap<String, Vec<SubJob>>,
}

impl JobCatalog {
    pub fn from_map(jobs: HashMap<String, Vec<SubJob>>) -> Self {
        JobCatalog { jobs }
    }

    /// Load `{job_name: [sub-jobs]}` from a JSON file. A missing file
    /// yields an empty catalog.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            warn!(path = %path.display(), "no job catalog file, starting empty");
            return Ok(JobCatalog::default());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        let jobs: HashMap<String, Vec<SubJob>> = serde_json::from_str(&raw)?;
        Ok(JobCatalog { jobs })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, job_name: &str) -> bool {
        self.jobs.contains_key(job_name)
    }

    /// Flatten a job into executable sub-jobs, expanding CHAIN entries
    /// recursively. Cycles and dangling references are rejected.
    pub fn resolve(&self, job_name: &str) -> Result<Vec<SubJob>> {
        let mut trail = Vec::new();
        self.resolve_inner(job_name, &mut trail)
    }

    fn resolve_inner(&self, job_name: &str, trail: &mut Vec<String>) -> Result<Vec<SubJob>> {
        if trail.iter().any(|seen| seen == job_name) {
            return Err(CoreError::ConfigInvalid(format!(
                "job chain cycle through {job_name}"
            )));
        }
        let steps = self
            .jobs
            .get(job_name)
            .ok_or_else(|| CoreError::NotFound(format!("job {job_name}")))?;

        trail.push(job_name.to_string());
        let mut resolved = Vec::with_capacity(steps.len());
        for step in steps {
            if step.job_type == SubJobType::Chain {
                resolved.extend(self.resolve_inner(&step.syntax, trail)?);
            } else {
                resolved.push(step.clone());
            }
        }
        trail.pop();
        Ok(resolved)
    }
}

/// Load auto-command descriptors from a JSON file; missing file means
/// no auto-commands.
pub async fn load_autocommands(path: &Path) -> Result<Vec<AutoCommand>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(Vec::new());
    }
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}
