//! HTTP and WebSocket surface of the roverd fleet controller.
//!
//! The binary wires the orchestration core (`roverd-core`) to the
//! outside world: telemetry ingest over HTTP, the device command
//! channel over WebSocket, onboarding sessions and package downloads.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{ApiError, ApiResult};
pub use state::AppState;
