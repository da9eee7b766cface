//! Client configuration

use std::time::Duration;

use keon_types::{KeonError, KeonResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Environment variable prefix, e.g. `KEON_BASE_URL`, `KEON_AUTH__API_KEY`.
pub const ENV_PREFIX: &str = "KEON";

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Runtime base URL, e.g. `https://api.keon.systems/runtime/v1`
    #[serde(default)]
    pub base_url: String,

    /// Credentials
    #[serde(default)]
    pub auth: AuthConfig,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: AuthConfig::default(),
            timeout_secs: default_timeout(),
            retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// API credentials. At most one may be set.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Sent as `X-API-Key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthConfig")
            .field("api_key", &redact(&self.api_key))
            .field("bearer_token", &redact(&self.bearer_token))
            .finish()
    }
}

impl AuthConfig {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            bearer_token: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            api_key: None,
            bearer_token: Some(token.into()),
        }
    }

    pub fn validate(&self) -> KeonResult<()> {
        if self.api_key.is_some() && self.bearer_token.is_some() {
            return Err(KeonError::Config(
                "api_key and bearer_token are mutually exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers

fn default_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Configuration for `base_url` with every other setting defaulted.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration: defaults, then an optional file, then `KEON_*`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&str>) -> KeonResult<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(
            config::Config::try_from(&ClientConfig::default()).map_err(config_error)?,
        );

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with KEON_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KeonResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(KeonError::Config("base_url is required".into()));
        }
        let url = Url::parse(&self.base_url)
            .map_err(|e| KeonError::Config(format!("base_url {:?} is invalid: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(KeonError::Config(format!(
                "base_url must use http or https, got {}",
                url.scheme()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(KeonError::Config("timeout_secs must be positive".into()));
        }
        self.auth.validate()?;
        self.retry.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn config_error(err: config::ConfigError) -> KeonError {
    KeonError::Config(err.to_string())
}
