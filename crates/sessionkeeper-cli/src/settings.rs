//! Application settings.
//!
//! Settings are read from `~/.config/sessionkeeper/config.json` (or `--config`),
//! then overridden by `SESSIONKEEPER_*` environment variables (a `.env` file is
//! loaded first), then by command line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sessionkeeper_core::Config;

/// Application name used for config/data directory paths
const APP_NAME: &str = "sessionkeeper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_PREFIX: &str = "SESSIONKEEPER_";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub core: Config,
    pub data_dir: Option<PathBuf>,
    /// Whether the storage secret came from config or the environment rather
    /// than the OS keychain.
    #[serde(skip)]
    pub explicit_secret: bool,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let raw: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            let explicit_secret = raw.get("storage_secret").is_some();
            let mut settings: Settings = serde_json::from_value(raw)
                .with_context(|| format!("Invalid settings in {}", path.display()))?;
            settings.explicit_secret = explicit_secret;
            settings
        } else {
            Self::default()
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where tokens and the device id are kept.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Apply `SESSIONKEEPER_*` overrides. `lookup` is `std::env::var` outside tests.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };

        if let Some(url) = var("API_URL") {
            self.core.api_base_url = url;
        }
        if let Some(secs) = var("ACCESS_TOKEN_EXPIRY") {
            self.core.access_token_expiry_seconds = parse_env("ACCESS_TOKEN_EXPIRY", &secs)?;
        }
        if let Some(secs) = var("REFRESH_TOKEN_EXPIRY") {
            self.core.refresh_token_expiry_seconds = parse_env("REFRESH_TOKEN_EXPIRY", &secs)?;
        }
        if let Some(secs) = var("REFRESH_THRESHOLD") {
            self.core.auto_refresh_threshold_seconds = parse_env("REFRESH_THRESHOLD", &secs)?;
        }
        if let Some(max) = var("MAX_SESSIONS") {
            self.core.max_concurrent_sessions = parse_env("MAX_SESSIONS", &max)?;
        }
        if let Some(flag) = var("FINGERPRINTING") {
            self.core.enable_fingerprinting = parse_env("FINGERPRINTING", &flag)?;
        }
        if let Some(flag) = var("SECURE_STORAGE") {
            self.core.enable_secure_storage = parse_env("SECURE_STORAGE", &flag)?;
        }
        if let Some(namespace) = var("NAMESPACE") {
            self.core.storage_namespace = namespace;
        }
        if let Some(secret) = var("STORAGE_SECRET") {
            self.core.storage_secret = secret;
            self.explicit_secret = true;
        }
        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{}{}={:?}: {}", ENV_PREFIX, name, value, e))
}
