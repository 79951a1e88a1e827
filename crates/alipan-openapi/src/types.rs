//! Request and response types for the OAuth and drive endpoints

use std::time::SystemTime;

use common::Secret;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{DEFAULT_EXPIRES_IN, DEFAULT_QR_SIZE};
use crate::error::{Error, Result};

/// Application credentials sent to the token and QR endpoints.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
        }
    }

    /// Replace either half with a caller-supplied value; blank values keep
    /// the configured default.
    pub fn with_overrides(&self, client_id: Option<&str>, client_secret: Option<&str>) -> Self {
        let client_id = match client_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.client_id.clone(),
        };
        let client_secret = match client_secret.map(str::trim) {
            Some(secret) if !secret.is_empty() => Secret::new(secret.to_string()),
            _ => self.client_secret.clone(),
        };
        Self {
            client_id,
            client_secret,
        }
    }
}

/// Pixel size of the generated QR image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrDimensions {
    pub width: u32,
    pub height: u32,
}

impl QrDimensions {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}

impl Default for QrDimensions {
    fn default() -> Self {
        Self::square(DEFAULT_QR_SIZE)
    }
}

/// One QR-code login attempt, as created by the provider.
///
/// Immutable. Later polls refer to it by `session_id` and `qr_id` only; the
/// provider decides when it expires.
#[derive(Debug, Clone)]
pub struct QrSession {
    pub session_id: String,
    pub qr_id: String,
    pub qr_code_url: String,
    pub created_at: SystemTime,
}

impl QrSession {
    /// Build a session from the provider's `{sid, qrCodeUrl}` payload.
    pub(crate) fn from_payload(payload: &Value) -> Result<Self> {
        let session_id = non_empty_str(payload, "sid");
        let qr_code_url = non_empty_str(payload, "qrCodeUrl");
        let (Some(session_id), Some(qr_code_url)) = (session_id, qr_code_url) else {
            return Err(Error::MalformedResponse(format!(
                "QR response missing qrCodeUrl or sid: {payload}"
            )));
        };
        let qr_id = extract_qr_id(qr_code_url).ok_or_else(|| {
            Error::MalformedResponse(format!("could not extract QR id from URL: {qr_code_url}"))
        })?;

        Ok(Self {
            session_id: session_id.to_string(),
            qr_id: qr_id.to_string(),
            qr_code_url: qr_code_url.to_string(),
            created_at: SystemTime::now(),
        })
    }
}

/// The QR id is the path segment following `/qrcode/` in the image URL.
fn extract_qr_id(qr_code_url: &str) -> Option<&str> {
    let (_, rest) = qr_code_url.split_once("/qrcode/")?;
    let id = rest.split(['?', '#', '/']).next().unwrap_or_default();
    (!id.is_empty()).then_some(id)
}

/// Scan state of a QR session, read fresh from the provider on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    /// `WaitLogin`: nobody has scanned the code yet
    AwaitingScan,
    /// `ScanSuccess`: scanned, waiting for confirmation in the mobile app
    Scanned,
    /// `LoginSuccess`: confirmed; the payload carries the authorization code
    LoggedIn,
    /// `QRCodeExpired`
    Expired,
    Unknown(String),
}

impl LoginStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "WaitLogin" => Self::AwaitingScan,
            "ScanSuccess" => Self::Scanned,
            "LoginSuccess" => Self::LoggedIn,
            "QRCodeExpired" => Self::Expired,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::AwaitingScan => "WaitLogin",
            Self::Scanned => "ScanSuccess",
            Self::LoggedIn => "LoginSuccess",
            Self::Expired => "QRCodeExpired",
            Self::Unknown(raw) => raw,
        }
    }
}

/// One status observation. `auth_code` is only ever set alongside `LoggedIn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: LoginStatus,
    pub auth_code: Option<String>,
}

impl StatusReport {
    pub(crate) fn from_payload(payload: &Value) -> Self {
        let status = LoginStatus::from_wire(
            payload
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        );
        let auth_code = match status {
            LoginStatus::LoggedIn => non_empty_str(payload, "authCode").map(str::to_string),
            _ => None,
        };
        Self { status, auth_code }
    }
}

/// Token endpoint answer as the provider sent it; optional fields stay
/// optional until normalized into a `TokenPair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    pub(crate) fn from_payload(payload: &Value) -> Result<Self> {
        let access_token = non_empty_str(payload, "access_token").ok_or_else(|| {
            Error::MalformedResponse(format!("no access_token in token response: {payload}"))
        })?;
        let expires_in = payload.get("expires_in").and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        });

        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token: non_empty_str(payload, "refresh_token").map(str::to_string),
            expires_in: expires_in.filter(|secs| *secs > 0),
        })
    }

    /// Normalize into the client-facing shape. A missing refresh token is
    /// replaced by `fallback_refresh`; a missing lifetime by 7200 seconds.
    pub fn into_pair(self, fallback_refresh: &str) -> TokenPair {
        TokenPair {
            token_type: "Bearer".to_string(),
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .unwrap_or_else(|| fallback_refresh.to_string()),
            expires_in: self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        }
    }
}

/// Token pair handed back to the caller. Never persisted by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
}

/// Raw answer from a bearer-authenticated drive API call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON, or `{"raw_response": text}` when the body is not JSON
    pub body: Value,
    /// False when `body` is the `raw_response` wrapper
    pub parsed: bool,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn non_empty_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
