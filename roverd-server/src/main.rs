//! roverd fleet controller binary.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use roverd_core::autoconf::AutoconfManager;
use roverd_core::blob::{ApkStorage, DatabaseApkStorage, FilesystemApkStorage};
use roverd_core::jobs::{JobCatalog, JobLog, JobUpdater, JobUpdaterConfig, TracingEventSink, load_autocommands};
use roverd_core::mapping::MappingManager;
use roverd_core::mitm::{LatestDataMap, MitmIngest, TelemetryQueue};
use roverd_core::persistence::Repositories;
use roverd_server::websocket::WsRegistry;
use roverd_server::{AppState, ServerConfig, routes};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, trace, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "roverd-server")]
#[command(about = "Fleet controller: device orchestration, telemetry ingest and job execution")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address override.
    #[arg(long)]
    host: Option<String>,

    /// Bind port override.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate().context("invalid configuration")?;

    let repos = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .context("connecting to postgres")?;
            // Single-instance deployment; partition id 1.
            Repositories::postgres(pool, roverd_model::InstanceId(1))
        }
        None => {
            warn!("no database_url configured, state is process-local");
            Repositories::in_memory()
        }
    };

    let boot_time = Utc::now().timestamp();
    let mapping = MappingManager::new(repos.clone())
        .await
        .context("building configuration snapshot")?;
    mapping
        .start_route_managers()
        .await
        .context("starting route managers")?;

    let latest = Arc::new(LatestDataMap::new());
    let queue = Arc::new(TelemetryQueue::new(config.mitm.queue_capacity));
    let ingest = Arc::new(MitmIngest::new(
        latest,
        queue.clone(),
        boot_time,
        config.mitm.reject_pre_boot,
    ));
    spawn_telemetry_drain(queue.clone());

    let registry = Arc::new(WsRegistry::new());
    let autoconf = Arc::new(AutoconfManager::new(repos.autoconfig.clone()));

    let apk: Arc<dyn ApkStorage> = match config.apk.storage {
        roverd_server::config::ApkStorageKind::Filesystem => Arc::new(
            FilesystemApkStorage::open(config.apk.dir.clone())
                .await
                .context("opening package directory")?,
        ),
        roverd_server::config::ApkStorageKind::Database => {
            Arc::new(DatabaseApkStorage::new(repos.apk_blobs.clone()))
        }
    };

    let job_log = Arc::new(
        JobLog::open(config.jobs.log_path.clone())
            .await
            .context("opening job log")?,
    );
    let interrupted = job_log.kill_old_jobs().await?;
    if !interrupted.is_empty() {
        warn!(count = interrupted.len(), "interrupted stale jobs from previous run");
    }
    let jobs = JobUpdater::new(
        JobUpdaterConfig {
            workers: config.jobs.workers,
            job_restart_notconnect: config.jobs.restart_notconnect_minutes,
            install_dir: config.jobs.install_dir.clone(),
            supported_pogo_versions: config.jobs.supported_pogo_versions.clone(),
            command_timeout_s: config.jobs.command_timeout_s,
        },
        registry.clone(),
        apk.clone(),
        job_log,
        Arc::new(TracingEventSink),
    );
    jobs.start();

    if let Some(path) = &config.jobs.autocommands_path {
        let catalog = match &config.jobs.catalog_path {
            Some(catalog_path) => JobCatalog::load(catalog_path)
                .await
                .context("loading job catalog")?,
            None => JobCatalog::from_map(Default::default()),
        };
        let commands = load_autocommands(path)
            .await
            .context("loading auto-commands")?;
        jobs.apply_autocommands(&commands, &catalog).await?;
    }

    let state = AppState {
        advertise: AppState::advertise_from(&config),
        mapping,
        ingest,
        queue,
        registry,
        autoconf,
        apk,
        jobs: jobs.clone(),
        status_password: config.status_password.clone(),
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("parsing bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "roverd listening");

    axum::serve(listener, routes::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    jobs.shutdown();
    info!("shutdown complete");
    Ok(())
}

/// Downstream proto processing is out of scope here; the drain keeps
/// the bounded queue from sitting full forever.
fn spawn_telemetry_drain(queue: Arc<TelemetryQueue>) {
    tokio::spawn(async move {
        loop {
            let record = queue.pop().await;
            trace!(
                origin = record.origin,
                type_code = record.record.type_code,
                "telemetry drained"
            );
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to install ctrl-c handler");
    }
}
