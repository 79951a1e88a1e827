//! Exchange policy defaults and refresh-token validation rules

use std::time::Duration;

/// Token endpoint calls allowed per authorization code
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Attempt `n` waits `n * DEFAULT_BACKOFF_UNIT` before calling again
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Delay the polling page asks the browser to wait before checking again
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Shortest refresh token the relay forwards to the provider
pub const MIN_REFRESH_TOKEN_LEN: usize = 10;

/// Value shipped in alist's sample config
pub const PLACEHOLDER_REFRESH_TOKEN: &str = "your_refresh_token";

/// Substrings that mark a refresh token as unedited sample text
pub const PLACEHOLDER_MARKERS: &[&str] = &["your_", "placeholder"];

pub const GRANT_TYPE_REFRESH: &str = "refresh_token";
