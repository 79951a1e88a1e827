//! HTTP client for the Alipan OpenAPI
//!
//! Every method is a single round trip. Nothing here retries or sleeps.

use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::constants::{QRCODE_CREATE_PATH, TOKEN_PATH, USER_AGENT};
use crate::error::{Error, Rejection, Result};
use crate::types::{
    ApiResponse, ClientCredentials, QrDimensions, QrSession, StatusReport, TokenGrant,
};

/// Default per-request timeout when none is configured
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed wrapper over the provider endpoints.
///
/// Cheap to clone; the underlying `reqwest::Client` shares its pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    credentials: ClientCredentials,
    timeout: Duration,
}

impl Client {
    pub fn new(http: reqwest::Client, base_url: Url, credentials: ClientCredentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured application credentials.
    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// Public URL of the QR image the user scans.
    pub fn qr_image_url(&self, qr_id: &str) -> String {
        self.endpoint(&["oauth", "qrcode", qr_id])
            .map(String::from)
            .unwrap_or_default()
    }

    /// Create a QR login session.
    ///
    /// Any non-2xx answer is reported as `Unavailable` with a message starting
    /// "QR code generation failed".
    #[instrument(skip_all, fields(scopes = scopes.len()))]
    pub async fn create_qr_session(
        &self,
        scopes: &[String],
        dimensions: QrDimensions,
    ) -> Result<QrSession> {
        let url = self.endpoint_url(QRCODE_CREATE_PATH)?;
        let body = json!({
            "client_id": self.credentials.client_id,
            "client_secret": self.credentials.client_secret.expose(),
            "scopes": scopes,
            "width": dimensions.width,
            "height": dimensions.height,
        });

        let response = self
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("QR code generation failed: {e}")))?;
        let (status, body) = read_body(response).await?;
        debug!(status, "QR code endpoint answered");

        if !is_success(status) {
            let rejection = Rejection::from_payload(status, body.into_value());
            return Err(Error::Unavailable(format!(
                "QR code generation failed: {status} - {}",
                rejection.message
            )));
        }
        let payload = body.json().ok_or_else(|| {
            Error::MalformedResponse("QR code response is not valid JSON".into())
        })?;

        QrSession::from_payload(&payload)
    }

    /// Read the scan status of a session. No side effects.
    #[instrument(skip(self))]
    pub async fn poll_status(&self, session_id: &str) -> Result<StatusReport> {
        let url = self.endpoint(&["oauth", "qrcode", session_id, "status"])?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("status check failed: {e}")))?;
        let (status, body) = read_body(response).await?;

        if !is_success(status) {
            let rejection = Rejection::from_payload(status, body.into_value());
            return Err(Error::Unavailable(format!(
                "status check failed: {status} - {}",
                rejection.message
            )));
        }
        let payload = body.json().ok_or_else(|| {
            Error::MalformedResponse("status response is not valid JSON".into())
        })?;

        let report = StatusReport::from_payload(&payload);
        debug!(status = report.status.as_wire(), "QR status observed");
        Ok(report)
    }

    /// Trade an authorization code for a token grant (one network call).
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let body = json!({
            "client_id": self.credentials.client_id,
            "client_secret": self.credentials.client_secret.expose(),
            "grant_type": "authorization_code",
            "code": code,
        });
        self.token_request(body).await
    }

    /// Renew an access token with the given application credentials.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        credentials: &ClientCredentials,
    ) -> Result<TokenGrant> {
        let body = json!({
            "client_id": credentials.client_id,
            "client_secret": credentials.client_secret.expose(),
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        self.token_request(body).await
    }

    /// Bearer-authenticated drive API call.
    ///
    /// Only network failures are errors; any HTTP status comes back as a
    /// response for the caller to judge.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        access_token: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.endpoint_url(path)?;
        let mut request = self.request(method, url).bearer_auth(access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Unavailable(format!("reading response body: {e}")))?;
        let (body, parsed) = match serde_json::from_str(&text) {
            Ok(value) => (value, true),
            Err(_) => (json!({ "raw_response": text }), false),
        };

        debug!(path, status, parsed, "drive API answered");
        Ok(ApiResponse {
            status,
            body,
            parsed,
        })
    }

    #[instrument(skip_all, fields(grant_type = %body["grant_type"]))]
    async fn token_request(&self, body: Value) -> Result<TokenGrant> {
        let url = self.endpoint_url(TOKEN_PATH)?;
        let response = self
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("token request failed: {e}")))?;
        let (status, body) = read_body(response).await?;
        debug!(status, "token endpoint answered");

        // An error page from a proxy in front of the provider carries no
        // error code worth classifying.
        let Some(payload) = body.json() else {
            return Err(Error::MalformedResponse(format!(
                "token endpoint answered {status} with a non-JSON body"
            )));
        };
        if !is_success(status) {
            return Err(Error::Rejected(Rejection::from_payload(status, payload)));
        }

        TokenGrant::from_payload(&payload)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
    }

    /// Resolve a `/a/b/c` style path against the base URL.
    pub fn endpoint_url(&self, path: &str) -> Result<Url> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        self.endpoint(&segments)
    }

    /// Append path segments to the base URL, percent-encoding each one so
    /// caller-supplied ids cannot escape their segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Response body as read off the wire.
enum Body {
    Json(Value),
    NotJson(String),
}

impl Body {
    fn json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::NotJson(_) => None,
        }
    }

    /// Error bodies are classified either way; raw text becomes a string value.
    fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::NotJson(text) => Value::String(text),
        }
    }
}

async fn read_body(response: reqwest::Response) -> Result<(u16, Body)> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| Error::Unavailable(format!("reading response body: {e}")))?;

    let body = match serde_json::from_str::<Value>(&text) {
        Ok(value) => Body::Json(value),
        Err(_) => Body::NotJson(text),
    };
    Ok((status, body))
}
