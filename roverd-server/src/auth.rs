//! Request authentication against the configured credential set.

use crate::errors::ApiError;
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use roverd_core::mapping::MappingSnapshot;
use roverd_model::AuthLevel;

/// Verify HTTP Basic credentials at `required` level. An empty
/// credential set leaves the instance open, matching first-boot
/// behavior before any auth rows exist.
pub fn require_basic(
    headers: &HeaderMap,
    snapshot: &MappingSnapshot,
    required: AuthLevel,
) -> Result<(), ApiError> {
    if snapshot.auths.is_empty() {
        return Ok(());
    }
    let (username, password) = parse_basic(headers)
        .ok_or_else(|| ApiError::unauthorized("missing or malformed authorization header"))?;
    if snapshot.check_auth(&username, &password, required) {
        Ok(())
    } else {
        Err(ApiError::forbidden("credentials rejected"))
    }
}

fn parse_basic(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Resolve the device origin named in the `Origin` header.
pub fn origin_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("Origin")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing Origin header"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = BASE64.encode(format!("{user}:{pass}"));
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn parses_basic_credentials() {
        let headers = basic("atv01", "secret:with:colons");
        let (user, pass) = parse_basic(&headers).unwrap();
        assert_eq!(user, "atv01");
        assert_eq!(pass, "secret:with:colons");
    }

    #[test]
    fn missing_origin_is_a_client_error() {
        let err = origin_from_headers(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}
