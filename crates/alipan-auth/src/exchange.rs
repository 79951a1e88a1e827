//! Authorization code exchange and refresh-token renewal
//!
//! The provider's token endpoint sometimes answers `InvalidCode` for a code
//! the status endpoint handed out moments earlier. That one code is retried
//! with a linear backoff; everything else fails on first sight so a truly
//! expired code surfaces quickly.

use std::time::Duration;

use alipan_openapi::{Client, ErrorCode, TokenPair};
use common::mask_token;
use tracing::{debug, info, instrument, warn};

use crate::constants::{DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_ATTEMPTS};
use crate::error::{ExchangeError, OAuthError};
use crate::grant::validate_refresh_token;

/// How a single token-endpoint call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    /// Transient rejection; another attempt follows
    Retry,
    Terminal,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Retry => "retry",
            Self::Terminal => "terminal",
        }
    }
}

/// Record of one token-endpoint call within a single exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAttempt {
    /// 1-based
    pub attempt: u32,
    pub error_code: Option<ErrorCode>,
    pub outcome: AttemptOutcome,
}

/// Successful exchange with the attempts it took.
#[derive(Debug, Clone)]
pub struct Exchanged {
    pub tokens: TokenPair,
    pub history: Vec<ExchangeAttempt>,
}

/// Exchanges codes and refreshes tokens against the provider.
#[derive(Debug, Clone)]
pub struct ExchangeEngine {
    client: Client,
    max_attempts: u32,
    backoff_unit: Duration,
}

impl ExchangeEngine {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Trade a one-time authorization code for a token pair.
    ///
    /// Makes at most `max_attempts` calls. Attempt `n > 1` first sleeps
    /// `n * backoff_unit`. The history of every attempt is returned on both
    /// success and failure.
    #[instrument(skip_all, fields(code = %mask_token(code)))]
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
    ) -> Result<Exchanged, ExchangeError> {
        let mut history = Vec::with_capacity(self.max_attempts as usize);
        let mut attempt = 1;

        loop {
            if attempt > 1 {
                let delay = self.backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            let err = match self.client.exchange_code(code).await {
                Ok(grant) => {
                    history.push(ExchangeAttempt {
                        attempt,
                        error_code: None,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    info!(attempt, "authorization code exchanged");
                    // The provider always issues a refresh token for a fresh
                    // login; nothing to fall back to here.
                    return Ok(Exchanged {
                        tokens: grant.into_pair(""),
                        history,
                    });
                }
                Err(err) => err,
            };

            let transient = matches!(err.code(), Some(ErrorCode::InvalidCode));
            let exhausted = attempt >= self.max_attempts;
            let outcome = if transient && !exhausted {
                AttemptOutcome::Retry
            } else {
                AttemptOutcome::Terminal
            };
            history.push(ExchangeAttempt {
                attempt,
                error_code: err.code().cloned(),
                outcome,
            });

            if !transient {
                warn!(attempt, error = %err, "authorization code exchange rejected");
                return Err(ExchangeError::Rejected {
                    attempt,
                    source: err,
                    history,
                });
            }
            if exhausted {
                warn!(attempts = attempt, error = %err, "authorization code exchange exhausted");
                return Err(ExchangeError::Exhausted { last: err, history });
            }

            warn!(attempt, error = %err, "authorization code not visible yet, retrying");
            attempt += 1;
        }
    }

    /// Pause before attempt `attempt`: `attempt * backoff_unit`, saturating
    /// instead of overflowing.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }

    /// Renew an access token on behalf of the client.
    ///
    /// Blank credential overrides fall back to the configured application.
    /// When the provider omits a new refresh token, the caller's token is
    /// handed back.
    #[instrument(skip_all, fields(refresh_token = %mask_token(refresh_token)))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<TokenPair, OAuthError> {
        validate_refresh_token(refresh_token)?;

        let credentials = self
            .client
            .credentials()
            .with_overrides(client_id, client_secret);
        debug!(client_id = %credentials.client_id, "refreshing access token");

        match self.client.refresh_token(refresh_token, &credentials).await {
            Ok(grant) => {
                info!("access token refreshed");
                Ok(grant.into_pair(refresh_token))
            }
            Err(alipan_openapi::Error::Rejected(rejection)) => {
                warn!(status = rejection.status, code = %rejection.code, "provider rejected refresh");
                Err(OAuthError::from_rejection(rejection))
            }
            Err(alipan_openapi::Error::MalformedResponse(detail)) => {
                warn!(%detail, "unusable refresh response");
                Err(OAuthError::server_error(
                    "Invalid response from authorization server",
                ))
            }
            Err(err) => {
                warn!(error = %err, "refresh request failed");
                Err(OAuthError::server_error(format!("Token refresh failed: {err}")))
            }
        }
    }
}
