//! Access-token validation
//!
//! A token is valid when any of a few cheap identity endpoints accepts it.
//! Endpoints are tried in order and the first 2xx wins.

use alipan_openapi::{ApiResponse, Client, DRIVE_INFO_PATH, SPACE_INFO_PATH, USER_INFO_PATH};
use common::mask_token;
use reqwest::Method;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::error::Result;

/// Tried with `POST {}` in this order
const VALIDATION_ENDPOINTS: [&str; 3] = [USER_INFO_PATH, DRIVE_INFO_PATH, SPACE_INFO_PATH];

#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetails {
    pub success_endpoint: Option<String>,
    pub tested_endpoints: usize,
    pub last_error: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// 200 when valid, 400 otherwise. Reported in the body; the HTTP
    /// response itself is always 200.
    pub status: u16,
    pub user_info: Option<Value>,
    pub validation_details: ValidationDetails,
}

#[derive(Debug, Clone)]
pub struct TokenValidator {
    client: Client,
}

impl TokenValidator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[instrument(skip_all, fields(token = %mask_token(access_token)))]
    pub async fn validate(&self, access_token: &str) -> Result<ValidationReport> {
        let mut last_error = None;

        for path in VALIDATION_ENDPOINTS {
            let url = self.client.endpoint_url(path)?;
            match self
                .client
                .call(Method::POST, path, access_token, Some(&json!({})))
                .await
            {
                Ok(response) if response.is_success() => {
                    info!(endpoint = path, "access token accepted");
                    let user_info = user_info(response, "Token valid but response parse failed");
                    return Ok(accepted(url.to_string(), user_info));
                }
                Ok(response) => {
                    debug!(endpoint = path, status = response.status, "access token refused");
                    last_error = Some(error_body(response));
                }
                Err(alipan_openapi::Error::Unavailable(message)) => {
                    debug!(endpoint = path, %message, "validation endpoint unreachable");
                    last_error = Some(json!({ "message": message }));
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Some gateways only answer the identity endpoint over GET
        let url = self.client.endpoint_url(USER_INFO_PATH)?;
        match self
            .client
            .call(Method::GET, USER_INFO_PATH, access_token, None)
            .await
        {
            Ok(response) if response.is_success() => {
                info!("access token accepted by GET fallback");
                let user_info = user_info(response, "Token valid (GET method)");
                return Ok(accepted(format!("{url} (GET)"), user_info));
            }
            Ok(response) => debug!(status = response.status, "GET fallback refused"),
            Err(err) => debug!(error = %err, "GET fallback failed"),
        }

        info!("access token rejected by every validation endpoint");
        Ok(ValidationReport {
            valid: false,
            status: 400,
            user_info: None,
            validation_details: ValidationDetails {
                success_endpoint: None,
                tested_endpoints: VALIDATION_ENDPOINTS.len(),
                last_error,
            },
        })
    }
}

fn accepted(endpoint: String, user_info: Value) -> ValidationReport {
    ValidationReport {
        valid: true,
        status: 200,
        user_info: Some(user_info),
        validation_details: ValidationDetails {
            success_endpoint: Some(endpoint),
            tested_endpoints: VALIDATION_ENDPOINTS.len(),
            last_error: None,
        },
    }
}

/// A 2xx body that is not JSON still proves the token works.
fn user_info(response: ApiResponse, unparsed: &str) -> Value {
    if response.parsed {
        response.body
    } else {
        json!({ "message": unparsed })
    }
}

fn error_body(response: ApiResponse) -> Value {
    if response.parsed {
        return response.body;
    }
    let text = response
        .body
        .get("raw_response")
        .cloned()
        .unwrap_or(Value::Null);
    json!({ "message": text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alipan_openapi::ClientCredentials;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::net::TcpListener;
    use url::Url;

    async fn spawn(app: axum::Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn validator(base_url: Url) -> TokenValidator {
        TokenValidator::new(Client::new(
            reqwest::Client::new(),
            base_url,
            ClientCredentials::new("app", "secret"),
        ))
    }

    fn unauthorized() -> (StatusCode, Json<Value>) {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "AccessTokenInvalid", "message": "token expired"})),
        )
    }

    #[tokio::test]
    async fn first_accepting_endpoint_wins() {
        let app = axum::Router::new()
            .route("/adrive/v1.0/user/get", post(|| async { unauthorized() }))
            .route(
                "/adrive/v1.0/user/getDriveInfo",
                post(|| async { Json(json!({"user_id": "u-1", "default_drive_id": "d-1"})) }),
            );
        let url = spawn(app).await;

        let report = validator(url).validate("at_valid").await.unwrap();
        assert!(report.valid);
        assert_eq!(report.status, 200);
        assert_eq!(report.user_info.unwrap()["user_id"], "u-1");
        assert!(
            report
                .validation_details
                .success_endpoint
                .unwrap()
                .ends_with("/adrive/v1.0/user/getDriveInfo")
        );
        assert_eq!(report.validation_details.tested_endpoints, 3);
    }

    #[tokio::test]
    async fn unparseable_success_still_counts() {
        let app = axum::Router::new().route("/adrive/v1.0/user/get", post(|| async { "ok" }));
        let url = spawn(app).await;

        let report = validator(url).validate("at_valid").await.unwrap();
        assert!(report.valid);
        assert_eq!(
            report.user_info.unwrap()["message"],
            "Token valid but response parse failed"
        );
    }

    #[tokio::test]
    async fn get_fallback_is_tried_last() {
        let app = axum::Router::new()
            .route(
                "/adrive/v1.0/user/get",
                post(|| async { unauthorized() }).get(|| async { Json(json!({"name": "alice"})) }),
            )
            .route("/adrive/v1.0/user/getDriveInfo", post(|| async { unauthorized() }))
            .route("/adrive/v1.0/user/getSpaceInfo", post(|| async { unauthorized() }));
        let url = spawn(app).await;

        let report = validator(url).validate("at_valid").await.unwrap();
        assert!(report.valid);
        assert!(
            report
                .validation_details
                .success_endpoint
                .unwrap()
                .ends_with("/adrive/v1.0/user/get (GET)")
        );
    }

    #[tokio::test]
    async fn rejected_everywhere_reports_last_error() {
        let app = axum::Router::new()
            .route(
                "/adrive/v1.0/user/get",
                post(|| async { unauthorized() }).get(|| async { unauthorized() }),
            )
            .route("/adrive/v1.0/user/getDriveInfo", post(|| async { unauthorized() }))
            .route(
                "/adrive/v1.0/user/getSpaceInfo",
                post(|| async { (StatusCode::BAD_GATEWAY, "gateway down") }),
            );
        let url = spawn(app).await;

        let report = validator(url).validate("at_bad").await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.status, 400);
        assert!(report.user_info.is_none());
        assert_eq!(
            report.validation_details.last_error,
            Some(json!({"message": "gateway down"}))
        );
    }

    #[tokio::test]
    async fn unreachable_provider_is_invalid_not_error() {
        let report = validator(Url::parse("http://127.0.0.1:1").unwrap())
            .validate("at_any")
            .await
            .unwrap();
        assert!(!report.valid);
        assert!(report.validation_details.last_error.unwrap()["message"].is_string());
    }
}
