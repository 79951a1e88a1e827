//! Capability battery for an access token
//!
//! Checks run one at a time, in a fixed order, because the later ones need
//! the drive id the first one discovers. A check that cannot reach the
//! provider is recorded as `network_error` and the battery carries on.

use std::time::{SystemTime, UNIX_EPOCH};

use alipan_openapi::{
    ApiResponse, Client, DRIVE_INFO_PATH, FILE_CREATE_PATH, FILE_DELETE_PATH, FILE_LIST_PATH,
    SPACE_INFO_PATH,
};
use common::mask_token;
use reqwest::Method;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// Prefix of the throwaway folder `create_folder_test` makes in the drive root
pub const PROBE_FOLDER_PREFIX: &str = "_relay_permission_probe_";

/// Remediation steps appended whenever a check fails
const REMEDIATION_STEPS: &[&str] = &[
    "Suggested fixes:",
    "1. Check the application's permission settings on the Alipan open platform",
    "2. Make sure the application has been granted every required scope",
    "3. Authorize again to obtain a token carrying the full scope set",
    "4. Contact Alipan open platform support if the problem persists",
];

#[derive(Debug, Clone, Copy)]
enum Check {
    UserInfo,
    SpaceInfo,
    ListRootFiles,
    CreateFolder,
}

impl Check {
    const ALL: [Check; 4] = [
        Check::UserInfo,
        Check::SpaceInfo,
        Check::ListRootFiles,
        Check::CreateFolder,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::UserInfo => "get_user_info",
            Self::SpaceInfo => "get_space_info",
            Self::ListRootFiles => "list_root_files",
            Self::CreateFolder => "create_folder_test",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::UserInfo => DRIVE_INFO_PATH,
            Self::SpaceInfo => SPACE_INFO_PATH,
            Self::ListRootFiles => FILE_LIST_PATH,
            Self::CreateFolder => FILE_CREATE_PATH,
        }
    }

    fn body(self, drive_id: &str) -> Value {
        match self {
            Self::UserInfo | Self::SpaceInfo => json!({}),
            Self::ListRootFiles => json!({
                "drive_id": drive_id,
                "parent_file_id": "root",
                "limit": 10,
                "all": false,
                "url_expire_sec": 1600,
                "fields": "*",
            }),
            Self::CreateFolder => json!({
                "drive_id": drive_id,
                "parent_file_id": "root",
                "name": probe_folder_name(),
                "type": "folder",
                "check_name_mode": "refuse",
            }),
        }
    }
}

fn probe_folder_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{PROBE_FOLDER_PREFIX}{millis}")
}

/// HTTP status of a check, or the marker for a call that never got one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Http(u16),
    NetworkError,
}

impl Serialize for CheckStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Http(code) => serializer.serialize_u16(*code),
            Self::NetworkError => serializer.serialize_str("network_error"),
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub api: &'static str,
    pub url: String,
    pub status: CheckStatus,
    pub success: bool,
    pub response: Option<Value>,
    /// Error body for a failed call, or the network error text
    pub error: Option<Value>,
}

impl CheckResult {
    fn from_response(check: Check, url: String, response: ApiResponse) -> Self {
        let success = response.is_success();
        Self {
            api: check.name(),
            url,
            status: CheckStatus::Http(response.status),
            success,
            error: (!success).then(|| response.body.clone()),
            response: Some(response.body),
        }
    }

    fn network_error(check: Check, url: String, error: String) -> Self {
        Self {
            api: check.name(),
            url,
            status: CheckStatus::NetworkError,
            success: false,
            response: None,
            error: Some(Value::String(error)),
        }
    }

    /// The provider refused the call for lack of scope.
    pub fn permission_denied(&self) -> bool {
        let Some(response) = &self.response else {
            return false;
        };
        response.get("code").and_then(Value::as_str) == Some("PermissionDenied")
            || response
                .get("message")
                .and_then(Value::as_str)
                .is_some_and(|m| m.contains("permission") || m.contains("Permission"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    pub total_tests: usize,
    pub successful: usize,
    pub failed: usize,
    pub permission_denied: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionReport {
    pub summary: ProbeSummary,
    pub drive_id: Option<String>,
    pub test_results: Vec<CheckResult>,
    pub recommendations: Vec<String>,
}

impl PermissionReport {
    fn new(drive_id: Option<String>, test_results: Vec<CheckResult>) -> Self {
        let successful = test_results.iter().filter(|r| r.success).count();
        let summary = ProbeSummary {
            total_tests: test_results.len(),
            successful,
            failed: test_results.len() - successful,
            permission_denied: test_results.iter().filter(|r| r.permission_denied()).count(),
        };
        let recommendations = recommendations(&test_results);
        Self {
            summary,
            drive_id,
            test_results,
            recommendations,
        }
    }
}

/// Human-readable advice for a set of results.
pub fn recommendations(results: &[CheckResult]) -> Vec<String> {
    let failed: Vec<&CheckResult> = results.iter().filter(|r| !r.success).collect();
    if failed.is_empty() {
        return vec!["All tested APIs work; permissions are configured correctly".to_string()];
    }

    let mut lines = vec!["Permission problems found:".to_string()];
    lines.extend(failed.iter().map(|result| {
        let denied = result
            .response
            .as_ref()
            .and_then(|r| r.get("code"))
            .and_then(Value::as_str)
            == Some("PermissionDenied");
        let hint = match result.status {
            _ if denied => "permission denied, check the application's permission settings".to_string(),
            CheckStatus::Http(404) => "endpoint not found, the API path may have changed".to_string(),
            CheckStatus::Http(401) => "token is invalid or expired".to_string(),
            _ => match &result.error {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => "unknown error".to_string(),
            },
        };
        format!("  - {}: {hint}", result.api)
    }));
    lines.extend(REMEDIATION_STEPS.iter().map(|step| step.to_string()));
    lines
}

/// Runs the capability battery with one access token.
#[derive(Debug, Clone)]
pub struct PermissionProbe {
    client: Client,
}

impl PermissionProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[instrument(skip_all, fields(token = %mask_token(access_token)))]
    pub async fn run(&self, access_token: &str) -> Result<PermissionReport> {
        let mut drive_id: Option<String> = None;
        let mut results = Vec::with_capacity(Check::ALL.len());

        for check in Check::ALL {
            let url = self.client.endpoint_url(check.path())?.to_string();
            let body = check.body(drive_id.as_deref().unwrap_or_default());
            debug!(api = check.name(), "running permission check");

            let response = match self
                .client
                .call(Method::POST, check.path(), access_token, Some(&body))
                .await
            {
                Ok(response) => response,
                Err(alipan_openapi::Error::Unavailable(message)) => {
                    warn!(api = check.name(), %message, "permission check could not reach provider");
                    results.push(CheckResult::network_error(check, url, message));
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if response.is_success() && drive_id.is_none() {
                drive_id = response
                    .body
                    .get("default_drive_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string);
            }
            if let Check::CreateFolder = check {
                self.cleanup(access_token, drive_id.as_deref(), &response).await;
            }

            results.push(CheckResult::from_response(check, url, response));
        }

        let report = PermissionReport::new(drive_id, results);
        info!(
            successful = report.summary.successful,
            failed = report.summary.failed,
            permission_denied = report.summary.permission_denied,
            "permission probe finished"
        );
        Ok(report)
    }

    /// Delete the probe folder. Failures are logged and otherwise ignored.
    async fn cleanup(&self, access_token: &str, drive_id: Option<&str>, created: &ApiResponse) {
        if !created.is_success() {
            return;
        }
        let Some(file_id) = created.body.get("file_id").and_then(Value::as_str) else {
            return;
        };
        let body = json!({ "drive_id": drive_id, "file_id": file_id });

        match self
            .client
            .call(Method::POST, FILE_DELETE_PATH, access_token, Some(&body))
            .await
        {
            Ok(response) if response.is_success() => debug!(file_id, "probe folder removed"),
            Ok(response) => {
                warn!(file_id, status = response.status, "could not remove probe folder")
            }
            Err(err) => warn!(file_id, error = %err, "could not remove probe folder"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

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

    fn probe(base_url: Url) -> PermissionProbe {
        PermissionProbe::new(Client::new(
            reqwest::Client::new(),
            base_url,
            ClientCredentials::new("app", "secret"),
        ))
    }

    /// Drive with full permissions whose delete endpoint fails.
    fn healthy_drive(deletes: Arc<AtomicU32>) -> axum::Router {
        axum::Router::new()
            .route(
                "/adrive/v1.0/user/getDriveInfo",
                post(|| async { Json(json!({"default_drive_id": "drive-9", "user_id": "u1"})) }),
            )
            .route(
                "/adrive/v1.0/user/getSpaceInfo",
                post(|| async { Json(json!({"personal_space_info": {"total_size": 1}})) }),
            )
            .route(
                "/adrive/v1.0/openFile/list",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["drive_id"], "drive-9");
                    assert_eq!(body["parent_file_id"], "root");
                    Json(json!({"items": []}))
                }),
            )
            .route(
                "/adrive/v1.0/openFile/create",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["drive_id"], "drive-9");
                    assert!(body["name"].as_str().unwrap().starts_with(PROBE_FOLDER_PREFIX));
                    Json(json!({"file_id": "f-1"}))
                }),
            )
            .route(
                "/adrive/v1.0/openFile/delete",
                post(move |Json(body): Json<Value>| {
                    let deletes = deletes.clone();
                    async move {
                        deletes.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(body["file_id"], "f-1");
                        (StatusCode::INTERNAL_SERVER_ERROR, "delete failed")
                    }
                }),
            )
    }

    #[tokio::test]
    async fn full_permissions_pass_even_when_cleanup_fails() {
        let deletes = Arc::new(AtomicU32::new(0));
        let url = spawn(healthy_drive(deletes.clone())).await;

        let report = probe(url).run("at_probe").await.unwrap();
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
        assert_eq!(report.drive_id.as_deref(), Some("drive-9"));
        assert_eq!(report.summary.total_tests, 4);
        assert_eq!(report.summary.successful, 4);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.recommendations.len(), 1);

        let names: Vec<_> = report.test_results.iter().map(|r| r.api).collect();
        assert_eq!(
            names,
            ["get_user_info", "get_space_info", "list_root_files", "create_folder_test"]
        );
    }

    #[tokio::test]
    async fn permission_denied_is_counted_and_explained() {
        let app = axum::Router::new()
            .route(
                "/adrive/v1.0/user/getDriveInfo",
                post(|| async { Json(json!({"default_drive_id": "drive-1"})) }),
            )
            .route(
                "/adrive/v1.0/user/getSpaceInfo",
                post(|| async {
                    (
                        StatusCode::FORBIDDEN,
                        Json(json!({"code": "PermissionDenied", "message": "no scope"})),
                    )
                }),
            )
            .route(
                "/adrive/v1.0/openFile/list",
                post(|| async {
                    (
                        StatusCode::FORBIDDEN,
                        Json(json!({"code": "Forbidden", "message": "Permission missing"})),
                    )
                }),
            )
            .route(
                "/adrive/v1.0/openFile/create",
                post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"code": "AccessTokenInvalid"}))) }),
            );
        let url = spawn(app).await;

        let report = probe(url).run("at_probe").await.unwrap();
        assert_eq!(report.summary.successful, 1);
        assert_eq!(report.summary.failed, 3);
        assert_eq!(report.summary.permission_denied, 2);

        let text = report.recommendations.join("\n");
        assert!(text.contains("get_space_info: permission denied"), "{text}");
        assert!(text.contains("create_folder_test: token is invalid or expired"), "{text}");
        assert!(text.contains("4. Contact Alipan open platform support"), "{text}");
        assert_eq!(report.test_results[1].error.as_ref().unwrap()["code"], "PermissionDenied");
    }

    #[tokio::test]
    async fn missing_endpoints_and_unknown_drive() {
        // Nothing routed: every check is a 404 and no drive id is discovered
        let url = spawn(axum::Router::new()).await;

        let report = probe(url).run("at_probe").await.unwrap();
        assert_eq!(report.drive_id, None);
        assert_eq!(report.summary.failed, 4);
        assert!(
            report
                .recommendations
                .iter()
                .any(|line| line.contains("list_root_files: endpoint not found"))
        );
    }

    #[tokio::test]
    async fn network_errors_are_recorded_per_check() {
        let report = probe(Url::parse("http://127.0.0.1:1").unwrap())
            .run("at_probe")
            .await
            .unwrap();
        assert_eq!(report.summary.total_tests, 4);
        assert!(
            report
                .test_results
                .iter()
                .all(|r| r.status == CheckStatus::NetworkError && r.response.is_none())
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["test_results"][0]["status"], "network_error");
        assert_eq!(json["drive_id"], Value::Null);
    }

    #[test]
    fn http_status_serializes_as_number() {
        assert_eq!(serde_json::to_value(CheckStatus::Http(403)).unwrap(), json!(403));
    }
}
