//! QR-login polling state machine
//!
//! Pure decision function plus a thin async driver. The browser's page
//! refresh is the only clock: each `/check-status` request runs exactly one
//! `poll()`, and session expiry is whatever the provider reports.

use std::time::Duration;

use alipan_openapi::{LoginStatus, StatusReport};
use tracing::{debug, info, instrument, warn};

use crate::constants::DEFAULT_POLL_INTERVAL;
use crate::error::ExchangeError;
use crate::exchange::{ExchangeEngine, Exchanged};

/// What to do with one status observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// Not logged in yet; check again after `delay`
    Wait { delay: Duration },
    /// Login confirmed; exchange this code once
    Exchange(String),
    /// The QR code expired; a new session is needed
    Expired,
    Fail(String),
}

/// Result of one poll cycle.
#[derive(Debug)]
pub enum PollOutcome {
    Pending {
        status: LoginStatus,
        retry_after: Duration,
    },
    Authorized(Exchanged),
    Expired,
    Failed(PollError),
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Status(#[from] alipan_openapi::Error),

    #[error("{0}")]
    Login(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Drives QR sessions from scan status to token pair.
#[derive(Debug, Clone)]
pub struct SessionPoller {
    engine: ExchangeEngine,
    poll_interval: Duration,
}

impl SessionPoller {
    pub fn new(engine: ExchangeEngine) -> Self {
        Self {
            engine,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn engine(&self) -> &ExchangeEngine {
        &self.engine
    }

    /// Map a status observation to the next step. No I/O.
    pub fn decide(&self, report: StatusReport) -> PollDecision {
        match report.status {
            LoginStatus::LoggedIn => match report.auth_code {
                Some(code) => PollDecision::Exchange(code),
                None => PollDecision::Fail("No auth code received from login success".into()),
            },
            LoginStatus::Expired => PollDecision::Expired,
            LoginStatus::AwaitingScan | LoginStatus::Scanned | LoginStatus::Unknown(_) => {
                PollDecision::Wait {
                    delay: self.poll_interval,
                }
            }
        }
    }

    /// Read the session's status once and act on it.
    ///
    /// Calls the exchange engine at most once per poll, and only after a
    /// `LoggedIn` observation.
    #[instrument(skip(self))]
    pub async fn poll(&self, session_id: &str) -> PollOutcome {
        let report = match self.engine.client().poll_status(session_id).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "could not read QR status");
                return PollOutcome::Failed(err.into());
            }
        };
        let status = report.status.clone();

        match self.decide(report) {
            PollDecision::Wait { delay } => {
                debug!(status = status.as_wire(), "login pending");
                PollOutcome::Pending {
                    status,
                    retry_after: delay,
                }
            }
            PollDecision::Exchange(code) => {
                info!("QR login confirmed, exchanging authorization code");
                match self.engine.exchange_authorization_code(&code).await {
                    Ok(exchanged) => PollOutcome::Authorized(exchanged),
                    Err(err) => PollOutcome::Failed(err.into()),
                }
            }
            PollDecision::Expired => {
                info!("QR code expired");
                PollOutcome::Expired
            }
            PollDecision::Fail(reason) => {
                warn!(%reason, "login reported without usable code");
                PollOutcome::Failed(PollError::Login(reason))
            }
        }
    }
}

/// Coarse category of a login failure, used to pick remediation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CodeExpired,
    ClientError,
    QrError,
    Unknown,
}

impl FailureKind {
    /// Classify by the provider codes and phrases that appear in the message.
    pub fn classify(message: &str) -> Self {
        if message.contains("InvalidCode") || message.contains("code not found") {
            Self::CodeExpired
        } else if message.contains("InvalidClientSecret") {
            Self::ClientError
        } else if message.contains("QR code generation failed") {
            Self::QrError
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeExpired => "code_expired",
            Self::ClientError => "client_error",
            Self::QrError => "qr_error",
            Self::Unknown => "unknown",
        }
    }

    /// What the user should do next.
    pub fn remediation(self) -> &'static str {
        match self {
            Self::CodeExpired => {
                "The authorization code expired or was already used. Scan a new QR code to authorize again."
            }
            Self::ClientError => {
                "The relay's client credentials were rejected. Ask the administrator to check the configuration."
            }
            Self::QrError => "The QR code could not be generated. Please try again shortly.",
            Self::Unknown => "Please start the authorization again.",
        }
    }

    /// Technical detail shown under the remediation. `None` means the raw
    /// error message is the best detail available.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::CodeExpired => Some(
                "Authorization codes are valid for 10 minutes and can be used only once. \
                 Leaving the page open too long or refreshing it repeatedly can consume the code.",
            ),
            Self::ClientError => Some("Client secret verification failed."),
            Self::QrError => {
                Some("Likely a network problem or the provider is temporarily unavailable.")
            }
            Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use alipan_openapi::{Client, ClientCredentials};
    use axum::Json;
    use axum::routing::{get, post};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use url::Url;

    fn report(status: LoginStatus, auth_code: Option<&str>) -> StatusReport {
        StatusReport {
            status,
            auth_code: auth_code.map(str::to_string),
        }
    }

    fn offline_poller() -> SessionPoller {
        let client = Client::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:1").unwrap(),
            ClientCredentials::new("app", "secret"),
        );
        SessionPoller::new(ExchangeEngine::new(client))
    }

    /// Provider whose status endpoint always reports `status` and whose
    /// token endpoint counts calls.
    async fn provider(status: &'static str, auth_code: Option<&'static str>) -> (Url, Arc<AtomicU32>) {
        let exchanges = Arc::new(AtomicU32::new(0));
        let counter = exchanges.clone();
        let app = axum::Router::new()
            .route(
                "/oauth/qrcode/{sid}/status",
                get(move || async move { Json(json!({"status": status, "authCode": auth_code})) }),
            )
            .route(
                "/oauth/access_token",
                post(move |Json(body): Json<Value>| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(body["code"], "code-42");
                        Json(json!({"access_token": "at_qr", "refresh_token": "rt_qr", "expires_in": 7200}))
                    }
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (Url::parse(&format!("http://{addr}")).unwrap(), exchanges)
    }

    fn poller(base_url: Url) -> SessionPoller {
        let client = Client::new(
            reqwest::Client::new(),
            base_url,
            ClientCredentials::new("app", "secret"),
        );
        SessionPoller::new(ExchangeEngine::new(client).with_backoff_unit(Duration::from_millis(1)))
    }

    #[test]
    fn waiting_states_poll_again() {
        let poller = offline_poller().with_poll_interval(Duration::from_secs(10));
        for status in [
            LoginStatus::AwaitingScan,
            LoginStatus::Scanned,
            LoginStatus::Unknown("Frozen".into()),
        ] {
            assert_eq!(
                poller.decide(report(status, None)),
                PollDecision::Wait {
                    delay: Duration::from_secs(10)
                }
            );
        }
    }

    #[test]
    fn login_success_exchanges_code() {
        let decision = offline_poller().decide(report(LoginStatus::LoggedIn, Some("c-1")));
        assert_eq!(decision, PollDecision::Exchange("c-1".into()));
    }

    #[test]
    fn login_success_without_code_fails() {
        let decision = offline_poller().decide(report(LoginStatus::LoggedIn, None));
        assert_eq!(
            decision,
            PollDecision::Fail("No auth code received from login success".into())
        );
    }

    #[test]
    fn expired_is_terminal() {
        assert_eq!(
            offline_poller().decide(report(LoginStatus::Expired, None)),
            PollDecision::Expired
        );
    }

    #[tokio::test]
    async fn waiting_poll_never_exchanges() {
        let (url, exchanges) = provider("WaitLogin", None).await;

        let outcome = poller(url).poll("sid-1").await;
        assert!(matches!(
            outcome,
            PollOutcome::Pending {
                status: LoginStatus::AwaitingScan,
                retry_after
            } if retry_after == Duration::from_secs(10)
        ));
        assert_eq!(exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn login_success_exchanges_exactly_once() {
        let (url, exchanges) = provider("LoginSuccess", Some("code-42")).await;

        let outcome = poller(url).poll("sid-1").await;
        match outcome {
            PollOutcome::Authorized(exchanged) => {
                assert_eq!(exchanged.tokens.access_token, "at_qr");
                assert_eq!(exchanged.tokens.refresh_token, "rt_qr");
            }
            other => panic!("expected authorization, got {other:?}"),
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_poll_reports_expiry() {
        let (url, exchanges) = provider("QRCodeExpired", None).await;

        assert!(matches!(poller(url).poll("sid-1").await, PollOutcome::Expired));
        assert_eq!(exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_provider_fails_poll() {
        let outcome = offline_poller().poll("sid-1").await;
        assert!(matches!(outcome, PollOutcome::Failed(PollError::Status(_))));
    }

    #[test]
    fn failure_classification() {
        assert_eq!(
            FailureKind::classify("provider returned 400: InvalidCode - code not found"),
            FailureKind::CodeExpired
        );
        assert_eq!(FailureKind::classify("code not found"), FailureKind::CodeExpired);
        assert_eq!(
            FailureKind::classify("provider returned 401: InvalidClientSecret"),
            FailureKind::ClientError
        );
        assert_eq!(
            FailureKind::classify("provider unavailable: QR code generation failed: 500"),
            FailureKind::QrError
        );
        assert_eq!(FailureKind::classify("socket closed"), FailureKind::Unknown);
        assert_eq!(FailureKind::Unknown.hint(), None);
        assert_eq!(FailureKind::CodeExpired.as_str(), "code_expired");
    }
}
