use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::capabilities::{KeyNamespace, KvKey, ValidatedUrl};
use crate::{
    AppError, ErrorKind, DEFAULT_API_BASE_URL, DEFAULT_REFRESH_INTERVAL, LOGIN_TIMEOUT,
    MIN_REFRESH_INTERVAL, MUTATION_TIMEOUT, PROFILE_CACHE_KEY, REFRESH_TIMEOUT,
};

const MAX_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid api_base_url: {0}")]
    BaseUrl(String),
    #[error("refresh_interval_secs must be at least {min}, got {got}")]
    RefreshInterval { min: u64, got: u64 },
    #[error("{field} must be between 1 and {max} ms, got {got}")]
    Timeout {
        field: &'static str,
        max: u64,
        got: u64,
    },
    #[error("invalid profile_cache_key: {0}")]
    CacheKey(String),
    #[error("could not parse config: {0}")]
    Parse(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub refresh_interval_secs: u64,
    pub request_timeout_ms: u64,
    pub mutation_timeout_ms: u64,
    pub login_timeout_ms: u64,
    pub profile_cache_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            request_timeout_ms: duration_ms(REFRESH_TIMEOUT),
            mutation_timeout_ms: duration_ms(MUTATION_TIMEOUT),
            login_timeout_ms: duration_ms(LOGIN_TIMEOUT),
            profile_cache_key: PROFILE_CACHE_KEY.to_string(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Parses and validates. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        let min = MIN_REFRESH_INTERVAL.as_secs();
        if self.refresh_interval_secs < min {
            return Err(ConfigError::RefreshInterval {
                min,
                got: self.refresh_interval_secs,
            });
        }

        for (field, got) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("mutation_timeout_ms", self.mutation_timeout_ms),
            ("login_timeout_ms", self.login_timeout_ms),
        ] {
            if got == 0 || got > MAX_TIMEOUT_MS {
                return Err(ConfigError::Timeout {
                    field,
                    max: MAX_TIMEOUT_MS,
                    got,
                });
            }
        }

        KvKey::new(KeyNamespace::Session, self.profile_cache_key.as_str())
            .map_err(|e| ConfigError::CacheKey(e.to_string()))?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<ValidatedUrl, ConfigError> {
        ValidatedUrl::new(self.api_base_url.as_str()).map_err(|e| ConfigError::BaseUrl(e.to_string()))
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    #[must_use]
    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }
}
