use std::time::Duration;

use crate::encoding::from_base64;

/// Default base URL of the log service
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
/// Default pause between sequencing checks in `add_leaf_and_wait`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default per-request HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("missing required setting {0}")]
    Missing(&'static str),
    /// A setting is present but cannot be parsed
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Tunables of the verifying client itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Pause between root updates while waiting for a queued leaf to be sequenced
    pub poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Settings for talking to a remote log, read from the environment.
///
/// | variable | meaning |
/// |---|---|
/// | `MRKL_SERVER_URL` | base URL of the log API |
/// | `MRKL_LOG_NAME` | log to operate on |
/// | `MRKL_PUBLIC_KEY` | base64 Ed25519 key the log signs roots with |
/// | `MRKL_POLL_INTERVAL_MS` | sequencing poll interval |
/// | `MRKL_REQUEST_TIMEOUT_SECS` | HTTP request timeout |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server_url: String,
    pub log_name: Option<String>,
    pub public_key: Option<Vec<u8>>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            log_name: None,
            public_key: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup("MRKL_SERVER_URL") {
            config.server_url = url.trim_end_matches('/').to_string();
        }
        config.log_name = lookup("MRKL_LOG_NAME").filter(|name| !name.is_empty());
        if let Some(key) = lookup("MRKL_PUBLIC_KEY") {
            config.public_key = Some(parse_public_key(&key)?);
        }
        if let Some(ms) = lookup("MRKL_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_number("MRKL_POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(secs) = lookup("MRKL_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_number("MRKL_REQUEST_TIMEOUT_SECS", &secs)?);
        }
        Ok(config)
    }

    /// The configured log name
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no log name was configured.
    pub fn require_log_name(&self) -> Result<&str, ConfigError> {
        self.log_name.as_deref().ok_or(ConfigError::Missing("MRKL_LOG_NAME"))
    }

    /// The configured public key
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no key was configured.
    pub fn require_public_key(&self) -> Result<&[u8], ConfigError> {
        self.public_key.as_deref().ok_or(ConfigError::Missing("MRKL_PUBLIC_KEY"))
    }

    /// Options for the client built from this config
    #[must_use]
    pub const fn client_options(&self) -> ClientOptions {
        ClientOptions {
            poll_interval: self.poll_interval,
        }
    }
}

/// Decodes a base64 Ed25519 public key
///
/// # Errors
///
/// Returns an error if `value` is not base64 or not 32 bytes long.
pub fn parse_public_key(value: &str) -> Result<Vec<u8>, ConfigError> {
    let key = from_base64(value).map_err(|e| ConfigError::InvalidValue {
        name: "MRKL_PUBLIC_KEY",
        reason: e.to_string(),
    })?;
    if key.len() != 32 {
        return Err(ConfigError::InvalidValue {
            name: "MRKL_PUBLIC_KEY",
            reason: format!("expected 32 bytes, got {}", key.len()),
        });
    }
    Ok(key)
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
        name,
        reason: e.to_string(),
    })
}
