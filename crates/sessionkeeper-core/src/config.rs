//! Token lifecycle configuration.
//!
//! A `Config` is supplied once, when the manager is built, and never changes
//! afterwards. Loading it from disk or the environment is the job of the
//! embedding application (see the `sessionkeeper` binary).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access tokens live for 15 minutes by default.
const DEFAULT_ACCESS_TOKEN_EXPIRY_SECONDS: u64 = 15 * 60;

/// Refresh tokens live for 7 days by default.
const DEFAULT_REFRESH_TOKEN_EXPIRY_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Refresh 5 minutes before the access token expires.
const DEFAULT_AUTO_REFRESH_THRESHOLD_SECONDS: u64 = 5 * 60;

const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 5;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Prefix for every encrypted entry this crate writes.
const DEFAULT_STORAGE_NAMESPACE: &str = "secure_";

/// Static application secret the storage key is derived from.
/// Embedders should override it; it only protects data at rest.
const DEFAULT_STORAGE_SECRET: &str = "sessionkeeper-default-storage-secret";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("access token expiry must be greater than zero")]
    ZeroAccessExpiry,

    #[error("auto refresh threshold ({threshold}s) must be below the access token expiry ({expiry}s)")]
    ThresholdTooLarge { threshold: u64, expiry: u64 },

    #[error("refresh token expiry ({refresh}s) must not be shorter than the access token expiry ({access}s)")]
    RefreshShorterThanAccess { refresh: u64, access: u64 },

    #[error("max concurrent sessions must be at least 1")]
    ZeroSessionLimit,

    #[error("api base url must not be empty")]
    EmptyBaseUrl,

    #[error("storage namespace must not be empty")]
    EmptyNamespace,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub access_token_expiry_seconds: u64,
    pub refresh_token_expiry_seconds: u64,
    pub auto_refresh_threshold_seconds: u64,
    pub max_concurrent_sessions: usize,
    pub enable_fingerprinting: bool,
    pub enable_secure_storage: bool,
    pub api_base_url: String,
    pub storage_namespace: String,
    #[serde(skip_serializing)]
    pub storage_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_token_expiry_seconds: DEFAULT_ACCESS_TOKEN_EXPIRY_SECONDS,
            refresh_token_expiry_seconds: DEFAULT_REFRESH_TOKEN_EXPIRY_SECONDS,
            auto_refresh_threshold_seconds: DEFAULT_AUTO_REFRESH_THRESHOLD_SECONDS,
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            enable_fingerprinting: true,
            enable_secure_storage: true,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
            storage_secret: DEFAULT_STORAGE_SECRET.to_string(),
        }
    }
}

impl Config {
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_storage_secret(mut self, secret: impl Into<String>) -> Self {
        self.storage_secret = secret.into();
        self
    }

    /// Check the settings for combinations the manager cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_expiry_seconds == 0 {
            return Err(ConfigError::ZeroAccessExpiry);
        }
        if self.auto_refresh_threshold_seconds >= self.access_token_expiry_seconds {
            return Err(ConfigError::ThresholdTooLarge {
                threshold: self.auto_refresh_threshold_seconds,
                expiry: self.access_token_expiry_seconds,
            });
        }
        if self.refresh_token_expiry_seconds < self.access_token_expiry_seconds {
            return Err(ConfigError::RefreshShorterThanAccess {
                refresh: self.refresh_token_expiry_seconds,
                access: self.access_token_expiry_seconds,
            });
        }
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::ZeroSessionLimit);
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.storage_namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_threshold_must_be_below_expiry() {
        let config = Config {
            auto_refresh_threshold_seconds: 900,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdTooLarge { threshold: 900, expiry: 900 })
        );
    }

    #[test]
    fn test_rejects_zero_values() {
        let config = Config {
            access_token_expiry_seconds: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroAccessExpiry));

        let config = Config {
            max_concurrent_sessions: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroSessionLimit));

        let config = Config::default().with_api_base_url("  ");
        assert_eq!(config.validate(), Err(ConfigError::EmptyBaseUrl));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "https://auth.example.com/api/"}"#)
                .expect("Failed to parse partial config");
        assert_eq!(config.api_base_url, "https://auth.example.com/api/");
        assert_eq!(config.auto_refresh_threshold_seconds, 300);
        assert!(config.enable_secure_storage);
    }

    #[test]
    fn test_secret_is_not_serialized() {
        let json = serde_json::to_string(&Config::default().with_storage_secret("hunter2"))
            .expect("Failed to serialize config");
        assert!(!json.contains("hunter2"));
    }
}
