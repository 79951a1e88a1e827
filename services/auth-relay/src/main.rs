//! Alipan OAuth token relay
//!
//! Single-binary service that:
//! 1. Walks a browser through the Alipan QR-code login
//! 2. Exchanges the resulting authorization code for a token pair
//! 3. Serves alist's `AliyundriveOpen` driver a standard OAuth refresh endpoint
//! 4. Offers token validation and permission diagnostics

mod auth_flow;
mod config;
mod cors;
mod diagnostics;
mod error;
mod metrics;
mod pages;
mod token;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use alipan_auth::{ExchangeEngine, SessionPoller};
use alipan_openapi::{Client, QrDimensions};
use alipan_probe::{PermissionProbe, TokenValidator};
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use crate::config::{Config, ExchangeConfig};
use crate::error::{ApiError, method_not_allowed};
use crate::metrics::ServiceMetrics;

/// Graceful shutdown budget for in-flight requests
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    client: Client,
    poller: SessionPoller,
    validator: TokenValidator,
    probe: PermissionProbe,
    scopes: Arc<[String]>,
    qr_dimensions: QrDimensions,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

impl AppState {
    fn new(
        client: Client,
        exchange: &ExchangeConfig,
        scopes: Vec<String>,
        qr_dimensions: QrDimensions,
        prometheus: PrometheusHandle,
    ) -> Self {
        let engine = ExchangeEngine::new(client.clone())
            .with_max_attempts(exchange.max_attempts)
            .with_backoff_unit(exchange.backoff_unit());
        let poller = SessionPoller::new(engine).with_poll_interval(exchange.poll_interval());

        Self {
            validator: TokenValidator::new(client.clone()),
            probe: PermissionProbe::new(client.clone()),
            client,
            poller,
            scopes: scopes.into(),
            qr_dimensions,
            metrics: ServiceMetrics::new(),
            prometheus,
        }
    }
}

/// Build the axum router with all routes and shared state.
///
/// CORS is the outermost layer so preflight requests never reach routing,
/// and the concurrency limit bounds simultaneous provider fan-out.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(auth_flow::index))
        .route("/index", get(auth_flow::index))
        .route("/auth", get(auth_flow::start))
        .route("/check-status", get(auth_flow::check_status))
        .route("/token", post(token::token).fallback(method_not_allowed))
        .route(
            "/validate",
            post(diagnostics::validate).fallback(method_not_allowed),
        )
        .route(
            "/test-permissions",
            post(diagnostics::test_permissions).fallback(method_not_allowed),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics::track_requests,
        ))
        .layer(axum::middleware::from_fn(cors::cors))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Fresh id for correlating one request's log lines.
fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting alipan-auth-relay");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        base_url = %config.provider.base_url,
        client_id = %config.provider.client_id,
        scopes = config.provider.scopes.len(),
        max_attempts = config.exchange.max_attempts,
        "configuration loaded"
    );

    let base_url = Url::parse(&config.provider.base_url)
        .with_context(|| format!("invalid provider base_url {}", config.provider.base_url))?;
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let client = Client::new(http, base_url, config.credentials())
        .with_timeout(Duration::from_secs(config.server.timeout_secs));

    let app_state = AppState::new(
        client,
        &config.exchange,
        config.provider.scopes.clone(),
        QrDimensions::square(config.provider.qr_size),
        prometheus_handle,
    );
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the
    // timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: uptime and requests served.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);

    error::json_response(
        axum::http::StatusCode::OK,
        &serde_json::json!({
            "status": "healthy",
            "uptime_seconds": uptime,
            "requests_served": requests,
        }),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
