//! Alipan OAuth exchange and QR-login state machine
//!
//! Sits between the relay's HTTP handlers and `alipan-openapi`. It owns the
//! retry policy for authorization-code exchange, local validation of refresh
//! requests, and translation of provider error codes into the OAuth error
//! vocabulary the file-manager client understands.
//!
//! QR login flow:
//! 1. The relay creates a session with `alipan_openapi::Client::create_qr_session()`
//! 2. Each page refresh calls `SessionPoller::poll()` with the session id
//! 3. `SessionPoller::decide()` turns the scan status into a `PollDecision`
//! 4. On `LoggedIn`, `ExchangeEngine::exchange_authorization_code()` runs once
//!
//! Refresh flow:
//! 1. `parse_token_request()` validates the client's body
//! 2. `ExchangeEngine::refresh()` checks the token locally, then renews it

pub mod constants;
pub mod error;
pub mod exchange;
pub mod grant;
pub mod session;

pub use constants::*;
pub use error::{ExchangeError, OAuthError, OAuthErrorKind};
pub use exchange::{AttemptOutcome, ExchangeAttempt, ExchangeEngine, Exchanged};
pub use grant::{RefreshGrant, parse_token_request, validate_refresh_token};
pub use session::{FailureKind, PollDecision, PollError, PollOutcome, SessionPoller};
