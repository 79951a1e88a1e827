//! `/token`: the refresh contract alist's driver speaks
//!
//! Accepts `grant_type=refresh_token` as JSON or form data, validates it
//! locally, and renews the token through the exchange engine.

use alipan_auth::{OAuthError, parse_token_request};
use alipan_openapi::TokenPair;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use tracing::{info, instrument, warn};

use crate::AppState;
use crate::error::ApiError;
use crate::metrics;

/// POST /token
#[instrument(skip_all, fields(request_id = %crate::request_id()))]
pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TokenPair>, ApiError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    match refresh(&state, content_type, &body).await {
        Ok(tokens) => {
            metrics::record_refresh("success");
            info!(expires_in = tokens.expires_in, "token refreshed for client");
            Ok(Json(tokens))
        }
        Err(err) => {
            metrics::record_refresh(err.kind.as_str());
            warn!(error = %err, status = err.status, "token request refused");
            Err(err.into())
        }
    }
}

async fn refresh(
    state: &AppState,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<TokenPair, OAuthError> {
    let grant = parse_token_request(content_type, body)?;
    state
        .poller
        .engine()
        .refresh(
            &grant.refresh_token,
            grant.client_id.as_deref(),
            grant.client_secret.as_deref(),
        )
        .await
}
