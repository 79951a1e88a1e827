//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating relay configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let config_err = Error::Config("base_url must use http(s)".into());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: base_url must use http(s)"
        );

        let missing = Error::Missing("provider.client_id");
        assert_eq!(
            missing.to_string(),
            "Missing required setting: provider.client_id"
        );

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(io_err.to_string().starts_with("I/O error:"), "got: {io_err}");
    }

    #[test]
    fn toml_errors_convert() {
        let parse_err = toml::from_str::<toml::Table>("not valid {{{{ toml").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Toml(_)));
    }
}
