//! Parsing and local validation of `/token` request bodies
//!
//! Clients send either JSON or `application/x-www-form-urlencoded`. Nothing in
//! this module touches the network: every failure here is reported before the
//! provider sees the request.

use serde::Deserialize;
use serde_json::Value;

use crate::constants::{
    GRANT_TYPE_REFRESH, MIN_REFRESH_TOKEN_LEN, PLACEHOLDER_MARKERS, PLACEHOLDER_REFRESH_TOKEN,
};
use crate::error::{OAuthError, OAuthErrorKind};

/// A validated refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub refresh_token: String,
    /// Per-request application override; blank means "use the default"
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTokenRequest {
    grant_type: Option<String>,
    /// Left untyped so a non-string token is reported as a bad token
    refresh_token: Option<Value>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// Parse a `/token` body into a refresh grant.
///
/// The content type picks the decoder; an unknown or missing content type is
/// tried as JSON. Refresh-token shape is checked separately by
/// `validate_refresh_token`.
pub fn parse_token_request(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<RefreshGrant, OAuthError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(OAuthError::invalid_request("Request body is empty"));
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let raw = if mime == "application/x-www-form-urlencoded" {
        parse_form(body)
    } else {
        serde_json::from_slice::<RawTokenRequest>(body).map_err(|e| {
            OAuthError::invalid_request(format!("Invalid request body format: {e}"))
        })?
    };

    let grant_type = non_blank(raw.grant_type)
        .ok_or_else(|| OAuthError::invalid_request("Missing grant_type parameter"))?;
    if grant_type != GRANT_TYPE_REFRESH {
        return Err(OAuthError::new(
            OAuthErrorKind::UnsupportedGrantType,
            format!("Unsupported grant_type: {grant_type}"),
        ));
    }
    let refresh_token = match raw.refresh_token {
        Some(Value::String(token)) => non_blank(Some(token)),
        None | Some(Value::Null) => None,
        Some(_) => {
            return Err(OAuthError::invalid_token("refresh_token must be a string"));
        }
    }
    .ok_or_else(|| OAuthError::invalid_request("Missing refresh_token parameter"))?;

    Ok(RefreshGrant {
        refresh_token,
        client_id: non_blank(raw.client_id),
        client_secret: non_blank(raw.client_secret),
    })
}

/// Reject refresh tokens that cannot possibly be valid.
///
/// Catches truncated values and the sample text from alist's example config
/// without spending a provider call.
pub fn validate_refresh_token(refresh_token: &str) -> Result<(), OAuthError> {
    if refresh_token.chars().count() < MIN_REFRESH_TOKEN_LEN {
        return Err(OAuthError::invalid_token("refresh_token format is invalid"));
    }
    if refresh_token == PLACEHOLDER_REFRESH_TOKEN
        || PLACEHOLDER_MARKERS
            .iter()
            .any(|marker| refresh_token.contains(marker))
    {
        return Err(OAuthError::invalid_token(
            "refresh_token is a placeholder, please supply a real token",
        ));
    }
    Ok(())
}

fn parse_form(body: &[u8]) -> RawTokenRequest {
    url::form_urlencoded::parse(body).fold(RawTokenRequest::default(), |mut raw, (key, value)| {
        let value = Some(value.into_owned());
        match key.as_ref() {
            "grant_type" => raw.grant_type = value,
            "refresh_token" => raw.refresh_token = value.map(Value::String),
            "client_id" => raw.client_id = value,
            "client_secret" => raw.client_secret = value,
            _ => {}
        }
        raw
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: Option<&str> = Some("application/json");
    const FORM: Option<&str> = Some("application/x-www-form-urlencoded; charset=utf-8");

    #[test]
    fn parses_json_body() {
        let grant = parse_token_request(
            JSON,
            br#"{"grant_type":"refresh_token","refresh_token":"rt_0123456789","client_id":"app"}"#,
        )
        .unwrap();
        assert_eq!(grant.refresh_token, "rt_0123456789");
        assert_eq!(grant.client_id.as_deref(), Some("app"));
        assert_eq!(grant.client_secret, None);
    }

    #[test]
    fn parses_form_body() {
        let grant = parse_token_request(
            FORM,
            b"grant_type=refresh_token&refresh_token=rt%2B0123456789&client_secret=",
        )
        .unwrap();
        assert_eq!(grant.refresh_token, "rt+0123456789");
        assert_eq!(grant.client_secret, None);
    }

    #[test]
    fn unknown_content_type_is_tried_as_json() {
        let grant = parse_token_request(
            None,
            br#"{"grant_type":"refresh_token","refresh_token":"rt_0123456789"}"#,
        )
        .unwrap();
        assert_eq!(grant.refresh_token, "rt_0123456789");
    }

    #[test]
    fn empty_body_is_invalid_request() {
        let err = parse_token_request(JSON, b"  ").unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidRequest);
        assert_eq!(err.status, 400);
    }

    #[test]
    fn unparseable_body_is_invalid_request() {
        let err = parse_token_request(JSON, b"grant_type=refresh_token").unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidRequest);
    }

    #[test]
    fn missing_grant_type_is_invalid_request() {
        let err = parse_token_request(JSON, br#"{"refresh_token":"rt_0123456789"}"#).unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidRequest);
        assert!(err.description.contains("grant_type"));
    }

    #[test]
    fn other_grant_types_are_unsupported() {
        for grant_type in ["authorization_code", "client_credentials", "password"] {
            let body = format!(r#"{{"grant_type":"{grant_type}","refresh_token":"rt_0123456789"}}"#);
            let err = parse_token_request(JSON, body.as_bytes()).unwrap_err();
            assert_eq!(err.kind, OAuthErrorKind::UnsupportedGrantType, "{grant_type}");
            assert_eq!(err.status, 400);
        }
    }

    #[test]
    fn missing_refresh_token_is_invalid_request() {
        let err = parse_token_request(FORM, b"grant_type=refresh_token&refresh_token=").unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidRequest);
        assert!(err.description.contains("refresh_token"));
    }

    #[test]
    fn non_string_refresh_token_is_invalid_token() {
        for token in ["12345678901", "true", r#"["rt_0123456789"]"#] {
            let body = format!(r#"{{"grant_type":"refresh_token","refresh_token":{token}}}"#);
            let err = parse_token_request(JSON, body.as_bytes()).unwrap_err();
            assert_eq!(err.kind, OAuthErrorKind::InvalidToken, "{token}");
            assert_eq!(err.status, 400);
        }

        let err = parse_token_request(JSON, br#"{"grant_type":"refresh_token","refresh_token":null}"#)
            .unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidRequest);
    }

    #[test]
    fn short_tokens_are_rejected() {
        for token in ["", "short", "123456789"] {
            let err = validate_refresh_token(token).unwrap_err();
            assert_eq!(err.kind, OAuthErrorKind::InvalidToken, "{token:?}");
            assert_eq!(err.description, "refresh_token format is invalid");
        }
        assert!(validate_refresh_token("1234567890").is_ok());
    }

    #[test]
    fn placeholder_tokens_are_rejected() {
        for token in [
            "your_refresh_token",
            "paste_your_token_here",
            "placeholder-value-123",
        ] {
            let err = validate_refresh_token(token).unwrap_err();
            assert_eq!(err.kind, OAuthErrorKind::InvalidToken, "{token}");
        }
    }
}
