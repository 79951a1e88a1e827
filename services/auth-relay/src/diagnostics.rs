//! `/validate` and `/test-permissions`: access-token diagnostics

use alipan_auth::OAuthError;
use alipan_probe::{PermissionReport, ValidationReport};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;
use tracing::{error, instrument};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct AccessTokenRequest {
    access_token: Option<String>,
}

/// Pull `access_token` out of a JSON body.
///
/// An unreadable body is a server error; a missing or blank token is the
/// caller's mistake.
fn access_token(body: &[u8]) -> Result<String, OAuthError> {
    let request: AccessTokenRequest = serde_json::from_slice(body)
        .map_err(|e| OAuthError::server_error(format!("invalid request body: {e}")))?;
    request
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| OAuthError::invalid_request("access_token is required"))
}

/// POST /validate
#[instrument(skip_all, fields(request_id = %crate::request_id()))]
pub async fn validate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ValidationReport>, ApiError> {
    let token = access_token(&body)?;
    let report = state.validator.validate(&token).await.map_err(|e| {
        error!(error = %e, "token validation failed");
        OAuthError::server_error(e.to_string())
    })?;
    Ok(Json(report))
}

/// POST /test-permissions
#[instrument(skip_all, fields(request_id = %crate::request_id()))]
pub async fn test_permissions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PermissionReport>, ApiError> {
    let token = access_token(&body)?;
    let report = state.probe.run(&token).await.map_err(|e| {
        error!(error = %e, "permission probe failed");
        OAuthError::server_error(e.to_string())
    })?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alipan_auth::OAuthErrorKind;

    #[test]
    fn access_token_extraction() {
        assert_eq!(access_token(br#"{"access_token":"at_1"}"#).unwrap(), "at_1");

        let err = access_token(br#"{"access_token":"  "}"#).unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidRequest);
        assert_eq!(err.status, 400);

        let err = access_token(b"not json").unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::ServerError);
        assert_eq!(err.status, 500);
    }
}
