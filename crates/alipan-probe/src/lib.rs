//! Access-token diagnostics against the Alipan drive API
//!
//! `PermissionProbe` runs the handful of calls alist's driver depends on and
//! reports which ones the token is allowed to make. `TokenValidator` answers
//! the simpler question of whether the token is accepted at all.

pub mod error;
pub mod permissions;
pub mod validate;

pub use error::{Error, Result};
pub use permissions::{CheckResult, CheckStatus, PermissionProbe, PermissionReport, ProbeSummary};
pub use validate::{TokenValidator, ValidationDetails, ValidationReport};
