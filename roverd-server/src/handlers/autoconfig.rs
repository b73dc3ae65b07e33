//! Device onboarding endpoints.
//!
//! A factory-fresh device registers, the operator accepts it against a
//! configured device row, and the device then pulls its artifacts
//! (origin name, controller addresses, login mail) by session id.

use crate::auth;
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use roverd_model::{AuthLevel, SessionLogLine, SessionStatus};
use std::str::FromStr;

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn session_from_headers(headers: &HeaderMap) -> ApiResult<i64> {
    headers
        .get("session-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::bad_request("missing Session-Id header"))
}

fn status_text(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "pending",
        SessionStatus::Accepted => "accepted",
        SessionStatus::Rejected => "rejected",
        SessionStatus::Review => "review",
        SessionStatus::Failed => "failed",
    }
}

/// `POST /autoconfig/register` → 201 with the session id.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, String)> {
    let session_id = state.autoconf.register(&client_ip(&headers)).await?;
    Ok((StatusCode::CREATED, session_id.to_string()))
}

/// `GET /autoconfig/mymac`.
pub async fn get_mac(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<String> {
    let session_id = session_from_headers(&headers)?;
    Ok(state.autoconf.mac(session_id).await?.unwrap_or_default())
}

/// `POST /autoconfig/mymac` with the MAC as the plain-text body.
pub async fn set_mac(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    let session_id = session_from_headers(&headers)?;
    let mac = body.trim();
    if mac.is_empty() {
        return Err(ApiError::bad_request("empty MAC"));
    }
    state.autoconf.set_mac(session_id, mac).await?;
    Ok(StatusCode::OK)
}

/// `GET /autoconfig/{session}/{op}` for op in
/// status | origin | google | pd | rgc.
pub async fn session_op(
    State(state): State<AppState>,
    Path((session_id, op)): Path<(i64, String)>,
) -> ApiResult<String> {
    let registration = state.autoconf.get(session_id).await?;
    match op.as_str() {
        "status" => Ok(status_text(registration.status).to_string()),
        "origin" | "google" => {
            if registration.status != SessionStatus::Accepted {
                return Err(ApiError::conflict(format!(
                    "session {session_id} is {}",
                    status_text(registration.status)
                )));
            }
            let device_id = registration.device_id.ok_or_else(|| {
                ApiError::conflict(format!("session {session_id} has no device"))
            })?;
            let snapshot = state.mapping.snapshot();
            let device = snapshot
                .devices
                .values()
                .find(|d| d.id == device_id)
                .ok_or_else(|| ApiError::not_found(format!("device {device_id}")))?;
            if op == "origin" {
                Ok(device.name.clone())
            } else {
                device
                    .ggl_login_mail(snapshot.device_settings(device))
                    .ok_or_else(|| {
                        ApiError::not_found(format!("no google mail for {}", device.name))
                    })
            }
        }
        "pd" | "rgc" => {
            // Companion-app bootstrap config pointing back at this
            // controller.
            let scheme = if op == "rgc" { "ws" } else { "http" };
            Ok(format!(
                "websocket_uri={scheme}://{}/ws\npost_destination=http://{}/\nsession={session_id}\n",
                state.advertise, state.advertise
            ))
        }
        other => Err(ApiError::not_found(format!("unknown operation {other}"))),
    }
}

/// `POST /autoconfig/{session}/log` with a `level,message` body.
pub async fn append_log(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    body: String,
) -> ApiResult<StatusCode> {
    let line = SessionLogLine::from_str(body.trim())
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    state.autoconf.append_log(session_id, line).await?;
    Ok(StatusCode::CREATED)
}

/// `DELETE /autoconfig/{session}/complete`. Refused while the session
/// logged an error-level line.
pub async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let snapshot = state.mapping.snapshot();
    auth::require_basic(&headers, &snapshot, AuthLevel::Admin)?;
    state.autoconf.complete(session_id).await?;
    Ok(StatusCode::OK)
}

/// `POST /autoconfig/{session}/decide` — operator accept/reject.
pub async fn decide(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
    body: String,
) -> ApiResult<StatusCode> {
    let snapshot = state.mapping.snapshot();
    auth::require_basic(&headers, &snapshot, AuthLevel::Admin)?;

    let mut parts = body.trim().splitn(2, ',');
    let verdict = parts.next().unwrap_or_default().trim();
    let device = match parts.next() {
        Some(name) => {
            let name = name.trim();
            Some(
                snapshot
                    .device(name)
                    .ok_or_else(|| ApiError::not_found(format!("device {name}")))?
                    .id,
            )
        }
        None => None,
    };
    let status = match verdict {
        "accepted" => SessionStatus::Accepted,
        "rejected" => SessionStatus::Rejected,
        "review" => SessionStatus::Review,
        "pending" => SessionStatus::Pending,
        other => return Err(ApiError::bad_request(format!("unknown verdict {other}"))),
    };
    state.autoconf.set_status(session_id, status, device).await?;
    Ok(StatusCode::OK)
}
