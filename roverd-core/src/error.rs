use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Model error: {0}")]
    Model(#[from] roverd_model::ModelError),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Area {area} references missing geofence {geofence}")]
    GeofenceMissing { area: String, geofence: String },

    #[error("Device not connected: {0}")]
    DeviceNotConnected(String),

    #[error("Route recalculation already running for routecalc {0}")]
    RecalcBusy(i32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session failed: {0}")]
    SessionFailed(String),

    #[error("Command timed out after {0}s")]
    CommandTimeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
