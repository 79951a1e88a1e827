//! Typed client for the Alipan (Aliyun Drive) OpenAPI
//!
//! Wraps the three OAuth endpoints the relay depends on (QR-code creation,
//! QR status polling, and the token endpoint) plus a raw bearer-authenticated
//! call used by diagnostics. This crate does request/response mapping only;
//! retry policy and OAuth error translation live in `alipan-auth`.
//!
//! QR login flow as seen by this crate:
//! 1. `Client::create_qr_session()` returns the session id and QR image id
//! 2. `Client::poll_status()` is called until the status reports `LoggedIn`
//! 3. `Client::exchange_code()` trades the one-time code for a token grant
//! 4. `Client::refresh_token()` renews the grant later on

pub mod client;
pub mod constants;
pub mod error;
pub mod types;

pub use client::Client;
pub use constants::*;
pub use error::{Error, ErrorCode, Rejection, Result};
pub use types::{
    ApiResponse, ClientCredentials, LoginStatus, QrDimensions, QrSession, StatusReport,
    TokenGrant, TokenPair,
};
