//! Package version lookup and download.

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, header};
use roverd_model::{ApkArch, ApkType};
use std::str::FromStr;

fn parse_key(apk_type: &str, arch: &str) -> ApiResult<(ApkType, ApkArch)> {
    let unsupported = |what: String| {
        ApiError::new(axum::http::StatusCode::NOT_ACCEPTABLE, what)
    };
    let package = ApkType::from_str(apk_type)
        .map_err(|_| unsupported(format!("unsupported package {apk_type}")))?;
    let arch = ApkArch::from_str(arch)
        .map_err(|_| unsupported(format!("unsupported architecture {arch}")))?;
    Ok((package, arch))
}

/// `GET /mad_apk/{type}/{arch}` → stored version string.
pub async fn version(
    State(state): State<AppState>,
    Path((apk_type, arch)): Path<(String, String)>,
) -> ApiResult<String> {
    let (package, arch) = parse_key(&apk_type, &arch)?;
    state
        .apk
        .get_current_version(package, arch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no package stored for {apk_type}/{arch:?}")))
}

/// `GET /mad_apk/{type}/{arch}/download` → the binary with its stored
/// mimetype and filename.
pub async fn download(
    State(state): State<AppState>,
    Path((apk_type, arch)): Path<(String, String)>,
) -> ApiResult<(HeaderMap, Vec<u8>)> {
    let (package, arch) = parse_key(&apk_type, &arch)?;
    let (info, data) = state
        .apk
        .get_file(package, arch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no package stored for {apk_type}/{arch:?}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&info.mimetype)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", info.file_name))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((headers, data))
}
