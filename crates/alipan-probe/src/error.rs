//! Error types for probe runs

/// Failures that abort a whole probe run.
///
/// Per-call network failures are not errors: they are recorded in the report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid probe target: {0}")]
    Target(#[from] alipan_openapi::Error),
}

/// Result alias for probe runs.
pub type Result<T> = std::result::Result<T, Error>;
