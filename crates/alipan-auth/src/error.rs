//! OAuth error vocabulary and exchange failures

use std::fmt;

use alipan_openapi::{ErrorCode, Rejection};
use serde_json::{Value, json};

use crate::exchange::ExchangeAttempt;

/// Standard OAuth 2.0 error codes the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthErrorKind {
    InvalidRequest,
    InvalidToken,
    InvalidClient,
    UnsupportedGrantType,
    ServerError,
}

impl OAuthErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidToken => "invalid_token",
            Self::InvalidClient => "invalid_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::ServerError => "server_error",
        }
    }

    /// Status used when the error is raised locally. Provider-originated
    /// errors carry the provider's status instead.
    fn default_status(self) -> u16 {
        match self {
            Self::ServerError => 500,
            _ => 400,
        }
    }
}

impl fmt::Display for OAuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth error returned from `/token`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {description}")]
pub struct OAuthError {
    pub kind: OAuthErrorKind,
    pub description: String,
    /// HTTP status for the response
    pub status: u16,
    /// Raw provider payload, echoed back as `upstream_error`
    pub upstream: Option<Value>,
}

impl OAuthError {
    pub fn new(kind: OAuthErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            status: kind.default_status(),
            upstream: None,
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::InvalidRequest, description)
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::InvalidToken, description)
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::ServerError, description)
    }

    /// Translate a provider rejection of a refresh request.
    ///
    /// Keeps the provider's HTTP status and attaches its payload.
    pub fn from_rejection(rejection: Rejection) -> Self {
        let (kind, description) = match rejection.code {
            ErrorCode::InvalidRefreshToken => (
                OAuthErrorKind::InvalidToken,
                "The refresh token is invalid or expired".to_string(),
            ),
            ErrorCode::InvalidClientSecret => (
                OAuthErrorKind::InvalidClient,
                "Invalid client credentials".to_string(),
            ),
            ErrorCode::AppNotExists => (
                OAuthErrorKind::InvalidClient,
                "Application does not exist".to_string(),
            ),
            _ if rejection.message.is_empty() => (
                OAuthErrorKind::ServerError,
                "Token refresh failed".to_string(),
            ),
            _ => (OAuthErrorKind::ServerError, rejection.message.clone()),
        };
        Self {
            kind,
            description,
            status: rejection.status,
            upstream: Some(rejection.payload),
        }
    }

    /// Response body: `{error, error_description, upstream_error?}`.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": self.kind.as_str(),
            "error_description": self.description,
        });
        if let Some(upstream) = &self.upstream {
            body["upstream_error"] = upstream.clone();
        }
        body
    }
}

/// Authorization code exchange failure, carrying every attempt made.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Provider error that retrying cannot fix, or a network failure
    #[error("authorization code exchange failed on attempt {attempt}: {source}")]
    Rejected {
        attempt: u32,
        source: alipan_openapi::Error,
        history: Vec<ExchangeAttempt>,
    },

    /// Every attempt hit the code-visibility race
    #[error("authorization code exchange gave up after {} attempts: {last}", .history.len())]
    Exhausted {
        last: alipan_openapi::Error,
        history: Vec<ExchangeAttempt>,
    },
}

impl ExchangeError {
    pub fn history(&self) -> &[ExchangeAttempt] {
        match self {
            Self::Rejected { history, .. } | Self::Exhausted { history, .. } => history,
        }
    }

    pub fn last_error(&self) -> &alipan_openapi::Error {
        match self {
            Self::Rejected { source, .. } => source,
            Self::Exhausted { last, .. } => last,
        }
    }
}
