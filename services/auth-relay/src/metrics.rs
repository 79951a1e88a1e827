//! Prometheus metrics exposition
//!
//! - `relay_requests_total` (counter): labels `route`, `status`
//! - `relay_request_duration_seconds` (histogram): label `route`
//! - `relay_exchange_attempts_total` (counter): label `outcome`
//! - `relay_refresh_total` (counter): label `result`

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use alipan_auth::ExchangeAttempt;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::AppState;

const DURATION_METRIC: &str = "relay_request_duration_seconds";

/// Histogram buckets from 5ms to 60s, covering the provider timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Routes reported by name; anything else is labelled `other` to keep
/// label cardinality bounded.
const KNOWN_ROUTES: &[&str] = &[
    "/",
    "/index",
    "/auth",
    "/check-status",
    "/token",
    "/validate",
    "/test-permissions",
    "/health",
    "/metrics",
];

/// Counters backing `/health`
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `relay_request_duration_seconds` with explicit buckets so it
/// renders as a Prometheus histogram rather than the default summary.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = builder()?.install_recorder()?;
    Ok(handle)
}

fn builder() -> Result<PrometheusBuilder, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Record a completed request.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    let route = route_label(route);
    metrics::counter!("relay_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route).record(duration_secs);
}

/// Record every token-endpoint call made during one code exchange.
pub fn record_exchange(history: &[ExchangeAttempt]) {
    for attempt in history {
        metrics::counter!("relay_exchange_attempts_total", "outcome" => attempt.outcome.as_str())
            .increment(1);
    }
}

/// Record a `/token` outcome: `success` or the OAuth error code.
pub fn record_refresh(result: &'static str) {
    metrics::counter!("relay_refresh_total", "result" => result).increment(1);
}

fn route_label(path: &str) -> &'static str {
    KNOWN_ROUTES
        .iter()
        .find(|route| **route == path)
        .copied()
        .unwrap_or("other")
}

/// Middleware counting and timing every request.
pub async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let started = Instant::now();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let response = next.run(request).await;

    record_request(
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
