//! Client configuration.
//!
//! The base URL is looked up once, when the client is constructed. The
//! environment source reads `API_BASE_URL` and, optionally, `API_TIMEOUT_SECS`.

use std::time::Duration;

use crate::transport::DEFAULT_TIMEOUT;

pub const BASE_URL_VAR: &str = "API_BASE_URL";
pub const TIMEOUT_VAR: &str = "API_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(String),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Synchronous lookup of client settings.
pub trait ConfigSource {
    fn base_url(&self) -> Result<String, ConfigError>;

    /// Request timeout, if the source defines one.
    fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
        Ok(None)
    }
}

/// Reads settings from environment variables.
pub struct EnvConfig {
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvConfig {
    /// Reads the process environment.
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Reads through `lookup` instead of the process environment.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfig").finish_non_exhaustive()
    }
}

impl ConfigSource for EnvConfig {
    fn base_url(&self) -> Result<String, ConfigError> {
        self.get(BASE_URL_VAR)
            .ok_or_else(|| ConfigError::Missing(BASE_URL_VAR.to_string()))
    }

    fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
        let Some(raw) = self.get(TIMEOUT_VAR) else {
            return Ok(None);
        };
        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
            _ => Err(ConfigError::Invalid {
                key: TIMEOUT_VAR.to_string(),
                value: raw,
            }),
        }
    }
}

/// Settings a `NetworkService` is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let config = Self::new(source.base_url()?);
        Ok(match source.timeout()? {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        })
    }
}

impl ConfigSource for ClientConfig {
    fn base_url(&self) -> Result<String, ConfigError> {
        Ok(self.base_url.clone())
    }

    fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
        Ok(Some(self.timeout))
    }
}
