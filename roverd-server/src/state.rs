use crate::config::ServerConfig;
use crate::websocket::WsRegistry;
use roverd_core::autoconf::AutoconfManager;
use roverd_core::blob::ApkStorage;
use roverd_core::jobs::JobUpdater;
use roverd_core::mapping::MappingManager;
use roverd_core::mitm::{MitmIngest, TelemetryQueue};
use std::sync::Arc;

/// Shared handler state. Everything inside is an Arc, cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub mapping: Arc<MappingManager>,
    pub ingest: Arc<MitmIngest>,
    pub queue: Arc<TelemetryQueue>,
    pub registry: Arc<WsRegistry>,
    pub autoconf: Arc<AutoconfManager>,
    pub apk: Arc<dyn ApkStorage>,
    pub jobs: Arc<JobUpdater>,
    pub status_password: Option<String>,
    /// Host/port the server advertises in generated device configs.
    pub advertise: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("advertise", &self.advertise)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn advertise_from(config: &ServerConfig) -> String {
        format!("{}:{}", config.host, config.port)
    }
}
