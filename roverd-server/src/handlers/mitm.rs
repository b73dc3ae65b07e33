//! Telemetry ingest and the device parameter poll.

use crate::auth;
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use roverd_core::link::DeviceLink;
use roverd_core::mitm::DeviceParams;
use roverd_model::{AuthLevel, ProtoRecord};
use serde_json::{Value, json};
use tracing::debug;

fn known_origin(state: &AppState, headers: &HeaderMap) -> ApiResult<String> {
    let snapshot = state.mapping.snapshot();
    auth::require_basic(headers, &snapshot, AuthLevel::MitmData)?;
    let origin = auth::origin_from_headers(headers)?;
    if snapshot.device(&origin).is_none() {
        return Err(ApiError::not_found(format!("unknown origin {origin}")));
    }
    Ok(origin)
}

/// `POST /`: one proto record or an array of them.
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let origin = known_origin(&state, &headers)?;

    let records: Vec<ProtoRecord> = if body.is_array() {
        serde_json::from_value(body)
            .map_err(|err| ApiError::bad_request(format!("malformed record array: {err}")))?
    } else {
        vec![
            serde_json::from_value(body)
                .map_err(|err| ApiError::bad_request(format!("malformed record: {err}")))?,
        ]
    };

    let outcome = state
        .ingest
        .ingest(&origin, records, Utc::now().timestamp());
    debug!(
        origin,
        accepted = outcome.accepted,
        dropped_type = outcome.dropped_type,
        dropped_stale = outcome.dropped_stale,
        "ingest"
    );
    Ok(Json(json!({
        "accepted": outcome.accepted,
        "dropped_type": outcome.dropped_type,
        "dropped_stale": outcome.dropped_stale,
    })))
}

/// `GET /get_latest_mitm`: the per-device parameter set the worker
/// last published.
pub async fn get_latest(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<DeviceParams>> {
    let origin = known_origin(&state, &headers)?;
    Ok(Json(state.ingest.latest().params(&origin)))
}

/// `GET /status`: fleet overview for operators, gated by the raw
/// status password in the Authorization header.
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let expected = state
        .status_password
        .as_deref()
        .ok_or_else(|| ApiError::forbidden("status endpoint disabled"))?;
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected) {
        return Err(ApiError::unauthorized("bad status password"));
    }

    let latest = state.ingest.latest();
    Ok(Json(json!({
        "devices": latest.status_all(),
        "connected": state.registry.connected_origins(),
        "queued_telemetry": state.queue.len(),
        "queued_jobs": state.jobs.queued(),
    })))
}
