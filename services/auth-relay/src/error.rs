//! JSON error responses
//!
//! Per-request failures never propagate as Rust errors past the handler; they
//! are rendered here. HTML failure pages for the QR flow live in `pages`.

use alipan_auth::OAuthError;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

/// Handler failure rendered as a JSON body.
#[derive(Debug)]
pub enum ApiError {
    /// `{error, error_description, upstream_error?}` with the error's own status
    OAuth(OAuthError),
    /// `/check-status` called without `sid` or `qrid`
    MissingParameters,
    /// `/auth` could not create a QR session
    QrGeneration(String),
    NotFound(String),
    MethodNotAllowed,
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        Self::OAuth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::OAuth(err) => (
                StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                err.to_json(),
            ),
            Self::MissingParameters => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "MISSING_PARAMETERS",
                    "message": "Missing required parameters: sid and qrid",
                }),
            ),
            Self::QrGeneration(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "QR_GENERATION_FAILED",
                    "message": message,
                    "timestamp": timestamp(),
                }),
            ),
            Self::NotFound(path) => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "Not Found",
                    "message": format!("Path {path} not found"),
                }),
            ),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({
                    "error": "invalid_request",
                    "error_description": "Only POST method is allowed",
                }),
            ),
        };
        json_response(status, &body)
    }
}

pub fn json_response(status: StatusCode, body: &Value) -> Response {
    (status, [(CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Fallback for non-POST requests on the POST-only endpoints.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use alipan_auth::OAuthErrorKind;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn oauth_errors_use_their_own_status() {
        let mut err = OAuthError::new(OAuthErrorKind::InvalidClient, "Invalid client credentials");
        err.status = 401;
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_client");
        assert!(body.get("upstream_error").is_none());
    }

    #[tokio::test]
    async fn out_of_range_provider_status_becomes_500() {
        let mut err = OAuthError::server_error("odd");
        err.status = 42;
        let (status, _) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn qr_generation_failure_has_timestamp() {
        let (status, body) = render(ApiError::QrGeneration("QR code generation failed: 403".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "QR_GENERATION_FAILED");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn not_found_names_the_path() {
        let (status, body) = render(ApiError::NotFound("/nope".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Path /nope not found");
    }
}
