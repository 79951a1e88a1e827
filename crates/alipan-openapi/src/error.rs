//! Provider error classification

use std::fmt;

use serde_json::Value;

/// Structured `code` values the Alipan OpenAPI reports on failure.
///
/// The provider's set is open-ended, so anything not listed here lands in
/// `Other` with the raw code (or, when the field is missing, the raw message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// Authorization code unknown to the token endpoint. Seen both for
    /// genuinely expired codes and for codes the endpoint cannot see yet.
    InvalidCode,
    InvalidRefreshToken,
    InvalidClientSecret,
    AppNotExists,
    PermissionDenied,
    Other(String),
}

impl ErrorCode {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "InvalidCode" => Self::InvalidCode,
            "InvalidRefreshToken" => Self::InvalidRefreshToken,
            "InvalidClientSecret" => Self::InvalidClientSecret,
            "AppNotExists" => Self::AppNotExists,
            "PermissionDenied" => Self::PermissionDenied,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidCode => "InvalidCode",
            Self::InvalidRefreshToken => "InvalidRefreshToken",
            Self::InvalidClientSecret => "InvalidClientSecret",
            Self::AppNotExists => "AppNotExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-2xx answer from the provider.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub status: u16,
    pub code: ErrorCode,
    pub message: String,
    /// Raw provider payload, kept for diagnostics
    pub payload: Value,
}

impl Rejection {
    /// Classify a provider error payload.
    ///
    /// Reads the `code` field; when it is missing the raw message stands in
    /// as `ErrorCode::Other`.
    pub fn from_payload(status: u16, payload: Value) -> Self {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match &payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        let code = match payload.get("code").and_then(Value::as_str) {
            Some(raw) if !raw.is_empty() => ErrorCode::parse(raw),
            _ => ErrorCode::Other(message.clone()),
        };
        Self {
            status,
            code,
            message,
            payload,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider returned {}: {}", self.status, self.code)?;
        if !self.message.is_empty() && self.message != self.code.as_str() {
            write!(f, " - {}", self.message)?;
        }
        Ok(())
    }
}

/// Errors from provider calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure, timeout, or a QR endpoint refusing service
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// 2xx response missing required fields or not JSON
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Rejected(Rejection),

    #[error("invalid provider URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Provider error code, when the provider answered with one.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Rejected(rejection) => Some(&rejection.code),
            _ => None,
        }
    }
}

/// Result alias for provider calls.
pub type Result<T> = std::result::Result<T, Error>;
