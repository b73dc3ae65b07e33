//! Persistence ports and their adapters.
//!
//! The core never talks SQL directly; components consume the async
//! repository traits in [`ports`]. Two adapter families exist: the
//! in-memory adapters in [`memory`] (tests, and deployments without a
//! database) and the Postgres adapters in [`postgres`] built on sqlx
//! runtime queries.

pub mod memory;
pub mod ports;
pub mod postgres;

use std::sync::Arc;

use ports::{
    ApkBlobRepository, AuthRepository, AutoconfigRepository, ConfigRepository,
    ObservationRepository, PogoauthRepository, RoutecalcRepository,
};

/// Bundle of all repository handles, passed through the system instead
/// of a global database wrapper.
#[derive(Clone)]
pub struct Repositories {
    pub config: Arc<dyn ConfigRepository>,
    pub auth: Arc<dyn AuthRepository>,
    pub pogoauth: Arc<dyn PogoauthRepository>,
    pub routecalc: Arc<dyn RoutecalcRepository>,
    pub observations: Arc<dyn ObservationRepository>,
    pub autoconfig: Arc<dyn AutoconfigRepository>,
    pub apk_blobs: Arc<dyn ApkBlobRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

impl Repositories {
    /// All repositories backed by process-local memory.
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Repositories {
            config: store.clone(),
            auth: store.clone(),
            pogoauth: store.clone(),
            routecalc: store.clone(),
            observations: store.clone(),
            autoconfig: store.clone(),
            apk_blobs: store,
        }
    }

    /// All repositories backed by one Postgres pool.
    pub fn postgres(pool: sqlx::PgPool, instance_id: roverd_model::InstanceId) -> Self {
        let pg = Arc::new(postgres::PostgresStore::new(pool, instance_id));
        Repositories {
            config: pg.clone(),
            auth: pg.clone(),
            pogoauth: pg.clone(),
            routecalc: pg.clone(),
            observations: pg.clone(),
            autoconfig: pg.clone(),
            apk_blobs: pg,
        }
    }
}
