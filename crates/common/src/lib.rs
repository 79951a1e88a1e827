//! Shared types for the Alipan auth relay
//!
//! Holds the pieces every crate needs but none owns: secret redaction,
//! log-safe token masking, and the configuration error type.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, mask_token};
