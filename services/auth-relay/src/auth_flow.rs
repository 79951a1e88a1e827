//! Browser-facing QR login: `/`, `/auth` and `/check-status`
//!
//! No session state is kept server-side. `/auth` creates a provider session
//! and redirects to `/check-status?sid=..&qrid=..`; each reload of that page
//! runs one poll cycle.

use alipan_auth::{PollError, PollOutcome};
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::error::{ApiError, timestamp};
use crate::{AppState, metrics, pages};

const REFRESH: HeaderName = HeaderName::from_static("refresh");
const HTML: &str = "text/html; charset=utf-8";
const NO_CACHE: &str = "no-cache";
const NO_STORE: &str = "no-cache, no-store, must-revalidate";

/// Query string linking a poll to its QR session
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    sid: Option<String>,
    qrid: Option<String>,
}

/// GET / and /index
pub async fn index(headers: HeaderMap) -> Html<String> {
    Html(pages::index(&token_url(&headers)))
}

/// GET /auth: create a QR session and send the browser to its polling page.
#[instrument(skip_all, fields(request_id = %crate::request_id()))]
pub async fn start(State(state): State<AppState>) -> Response {
    let session = match state
        .client
        .create_qr_session(&state.scopes, state.qr_dimensions)
        .await
    {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "QR session creation failed");
            return ApiError::QrGeneration(err.to_string()).into_response();
        }
    };
    info!(sid = %session.session_id, qr_id = %session.qr_id, "QR session created");

    let target = check_status_path(&session.session_id, &session.qr_id);
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, HTML.to_string()),
            (REFRESH, format!("0; url={target}")),
            (CACHE_CONTROL, NO_STORE.to_string()),
        ],
        pages::redirect(&target),
    )
        .into_response()
}

/// GET /check-status: one poll cycle for the session named in the query.
#[instrument(skip_all, fields(request_id = %crate::request_id()))]
pub async fn check_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
    headers: HeaderMap,
) -> Response {
    let (Some(sid), Some(qrid)) = (non_empty(query.sid), non_empty(query.qrid)) else {
        return ApiError::MissingParameters.into_response();
    };

    match state.poller.poll(&sid).await {
        PollOutcome::Pending {
            status,
            retry_after,
        } => {
            let secs = retry_after.as_secs().max(1);
            let page = pages::waiting(&state.client.qr_image_url(&qrid), &status, secs);
            (
                StatusCode::OK,
                [
                    (CONTENT_TYPE, HTML.to_string()),
                    (REFRESH, format!("{secs}; url={}", check_status_path(&sid, &qrid))),
                    (CACHE_CONTROL, NO_CACHE.to_string()),
                ],
                page,
            )
                .into_response()
        }
        PollOutcome::Authorized(exchanged) => {
            metrics::record_exchange(&exchanged.history);
            info!(attempts = exchanged.history.len(), "QR login completed");
            html(
                StatusCode::OK,
                NO_STORE,
                pages::success(&exchanged.tokens, &token_url(&headers)),
            )
        }
        PollOutcome::Expired => html(StatusCode::OK, NO_CACHE, pages::expired()),
        PollOutcome::Failed(err) => {
            if let PollError::Exchange(exchange) = &err {
                metrics::record_exchange(exchange.history());
            }
            warn!(error = %err, "QR login failed");
            html(
                StatusCode::INTERNAL_SERVER_ERROR,
                NO_CACHE,
                pages::failure(&err.to_string(), &timestamp()),
            )
        }
    }
}

fn html(status: StatusCode, cache_control: &'static str, body: String) -> Response {
    (
        status,
        [(CONTENT_TYPE, HTML), (CACHE_CONTROL, cache_control)],
        body,
    )
        .into_response()
}

/// Relative URL of the polling page for a session.
fn check_status_path(sid: &str, qrid: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("sid", sid)
        .append_pair("qrid", qrid)
        .finish();
    format!("/check-status?{query}")
}

/// Public URL of `/token`, as the browser reached this relay.
fn token_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .filter(|proto| matches!(*proto, "http" | "https"))
        .unwrap_or("http");
    format!("{scheme}://{host}/token")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
