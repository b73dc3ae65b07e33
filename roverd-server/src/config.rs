//! Server configuration: TOML file, environment overrides, CLI flags.
//!
//! Precedence, lowest to highest: built-in defaults, config file,
//! `ROVERD_*` environment variables, command-line flags.

use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Password protecting `GET /status`; None disables the endpoint.
    pub status_password: Option<String>,
    /// Postgres connection string; the in-memory adapters are used
    /// when absent.
    pub database_url: Option<String>,
    pub mitm: MitmConfig,
    pub jobs: JobsConfig,
    pub apk: ApkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MitmConfig {
    /// Bounded telemetry queue capacity.
    pub queue_capacity: usize,
    /// Drop records whose device timestamp predates controller boot.
    pub reject_pre_boot: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsConfig {
    pub workers: usize,
    /// Minutes before a NOT_CONNECTED job is rescheduled; 0 fails it.
    pub restart_notconnect_minutes: i64,
    /// Directory INSTALLATION file arguments resolve against.
    pub install_dir: PathBuf,
    /// Crash-safe job log location.
    pub log_path: PathBuf,
    /// Optional job catalog descriptor (JSON).
    pub catalog_path: Option<PathBuf>,
    /// Optional auto-command descriptor (JSON).
    pub autocommands_path: Option<PathBuf>,
    pub supported_pogo_versions: Option<Vec<String>>,
    pub command_timeout_s: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApkConfig {
    /// `filesystem` or `database`.
    pub storage: ApkStorageKind,
    /// Package directory for the filesystem variant.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApkStorageKind {
    Filesystem,
    Database,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            status_password: None,
            database_url: None,
            mitm: MitmConfig::default(),
            jobs: JobsConfig::default(),
            apk: ApkConfig::default(),
        }
    }
}

impl Default for MitmConfig {
    fn default() -> Self {
        MitmConfig {
            queue_capacity: 8192,
            reject_pre_boot: true,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        JobsConfig {
            workers: 2,
            restart_notconnect_minutes: 0,
            install_dir: PathBuf::from("files"),
            log_path: PathBuf::from("update_log.json"),
            catalog_path: None,
            autocommands_path: None,
            supported_pogo_versions: None,
            command_timeout_s: 300,
        }
    }
}

impl Default for ApkConfig {
    fn default() -> Self {
        ApkConfig {
            storage: ApkStorageKind::Filesystem,
            dir: PathBuf::from("apks"),
        }
    }
}

impl ServerConfig {
    /// Parse a TOML config file; reading defaults when `path` is None.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => ServerConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("ROVERD_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("ROVERD_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(url) = std::env::var("ROVERD_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(password) = std::env::var("ROVERD_STATUS_PASSWORD") {
            self.status_password = Some(password);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.mitm.queue_capacity == 0 {
            bail!("mitm.queue_capacity must be non-zero");
        }
        if self.jobs.workers == 0 {
            bail!("jobs.workers must be non-zero");
        }
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                bail!("database_url must be a postgres:// connection string");
            }
        }
        Ok(())
    }
}
