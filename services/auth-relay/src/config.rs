//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from ALIPAN_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alipan_openapi::{ClientCredentials, DEFAULT_BASE_URL, DEFAULT_QR_SIZE, DEFAULT_SCOPES};

/// Upper bound for the exchange backoff unit
const MAX_BACKOFF_UNIT_MS: u64 = 60_000;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Per-request timeout for provider calls
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Alipan application settings
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to ALIPAN_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_qr_size")]
    pub qr_size: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client_id: String::new(),
            client_secret: None,
            client_secret_file: None,
            scopes: default_scopes(),
            qr_size: default_qr_size(),
        }
    }
}

/// Authorization code exchange policy
#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl ExchangeConfig {
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_qr_size() -> u32 {
    DEFAULT_QR_SIZE
}

fn default_max_attempts() -> u32 {
    alipan_auth::DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_unit_ms() -> u64 {
    alipan_auth::DEFAULT_BACKOFF_UNIT.as_millis() as u64
}

fn default_poll_interval_secs() -> u64 {
    alipan_auth::DEFAULT_POLL_INTERVAL.as_secs()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. ALIPAN_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(client_id) = std::env::var("ALIPAN_CLIENT_ID") {
            config.provider.client_id = client_id;
        }

        if let Ok(secret) = std::env::var("ALIPAN_CLIENT_SECRET") {
            config.provider.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.provider.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.provider.client_secret = Some(Secret::new(secret));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.provider.base_url
            )));
        }
        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.exchange.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.exchange.backoff_unit_ms > MAX_BACKOFF_UNIT_MS {
            return Err(common::Error::Config(format!(
                "backoff_unit_ms must be at most {MAX_BACKOFF_UNIT_MS}, got: {}",
                self.exchange.backoff_unit_ms
            )));
        }
        if self.exchange.poll_interval_secs == 0 {
            return Err(common::Error::Config(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.provider.qr_size == 0 {
            return Err(common::Error::Config("qr_size must be greater than 0".into()));
        }
        if self.provider.client_id.trim().is_empty() {
            return Err(common::Error::Missing("provider.client_id"));
        }
        match &self.provider.client_secret {
            Some(secret) if !secret.is_blank() => Ok(()),
            _ => Err(common::Error::Missing("provider.client_secret")),
        }
    }

    /// Default application credentials. Only valid after `load()`.
    pub fn credentials(&self) -> ClientCredentials {
        let secret = self
            .provider
            .client_secret
            .as_ref()
            .map(|s| s.expose().clone())
            .unwrap_or_default();
        ClientCredentials::new(self.provider.client_id.clone(), secret)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("alipan-auth-relay.toml")
    }
}
