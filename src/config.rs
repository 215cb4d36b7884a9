//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `SHOPSYNC_API_BASE` - Base URL of the shop API (default: `http://127.0.0.1:8000/api/`)
//! - `SHOPSYNC_SETTINGS_PATH` - Settings file (default: `<config dir>/shopsync/settings.json`)
//! - `SHOPSYNC_DEFAULT_USER` - User id used when none is stored (default: `u1`)
//! - `SHOPSYNC_TIMEOUT_SECS` - HTTP request timeout (default: 30)
//! - `SHOPSYNC_KEEP_UNUSED_SECS` - How long unobserved cache entries are kept (default: 60)
//! - `SHOPSYNC_STALE_SECS` - Age after which fresh entries go stale on read (default: never)
//! - `SHOPSYNC_LOG_DIR` - Directory for `shopsync.log` (default: `<data dir>/shopsync`)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::subscription::http::QueryConfig;

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/";
const DEFAULT_USER: &str = "u1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_KEEP_UNUSED_SECS: u64 = 60;
const APP_DIR: &str = "shopsync";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Cannot determine a default for {0}; set it explicitly")]
    NoDefaultDir(String),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API base URL, always ending in `/`.
    pub api_base: Url,
    /// Where the settings store persists `userId` and `adminKey`.
    pub settings_path: PathBuf,
    /// Seed for the user id when storage has none.
    pub default_user_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Query cache behavior.
    pub query: QueryConfig,
    /// Directory for the log file.
    pub log_dir: PathBuf,
}

impl ClientConfig {
    /// Loads configuration from the process environment, after reading a
    /// `.env` file if one is present.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value, or if a
    /// default directory is needed but cannot be determined.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_base = parse_base(
            &get("SHOPSYNC_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )?;

        let settings_path = match get("SHOPSYNC_SETTINGS_PATH") {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR).join("settings.json"))
                .ok_or_else(|| ConfigError::NoDefaultDir("SHOPSYNC_SETTINGS_PATH".to_string()))?,
        };

        let log_dir = match get("SHOPSYNC_LOG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or_else(|| ConfigError::NoDefaultDir("SHOPSYNC_LOG_DIR".to_string()))?,
        };

        let default_user_id = get("SHOPSYNC_DEFAULT_USER").unwrap_or_else(|| DEFAULT_USER.to_string());

        let timeout = Duration::from_secs(parse_secs(
            "SHOPSYNC_TIMEOUT_SECS",
            get("SHOPSYNC_TIMEOUT_SECS"),
        )?
        .unwrap_or(DEFAULT_TIMEOUT_SECS));

        let keep_unused_for = Duration::from_secs(
            parse_secs("SHOPSYNC_KEEP_UNUSED_SECS", get("SHOPSYNC_KEEP_UNUSED_SECS"))?
                .unwrap_or(DEFAULT_KEEP_UNUSED_SECS),
        );
        let stale_time =
            parse_secs("SHOPSYNC_STALE_SECS", get("SHOPSYNC_STALE_SECS"))?.map(Duration::from_secs);

        Ok(Self {
            api_base,
            settings_path,
            default_user_id,
            timeout,
            query: QueryConfig::new(stale_time, keep_unused_for),
            log_dir,
        })
    }
}

fn parse_base(value: &str) -> Result<Url, ConfigError> {
    let mut base = value.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let url = Url::parse(&base)
        .map_err(|e| ConfigError::InvalidEnvVar("SHOPSYNC_API_BASE".to_string(), e.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "SHOPSYNC_API_BASE".to_string(),
            format!("expected an http(s) URL, got {value}"),
        ));
    }
    Ok(url)
}

fn parse_secs(key: &str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    fn with_dirs(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut vars = vec![
            ("SHOPSYNC_SETTINGS_PATH", "/tmp/shopsync/settings.json"),
            ("SHOPSYNC_LOG_DIR", "/tmp/shopsync"),
        ];
        vars.extend_from_slice(extra);
        vars
    }

    #[test]
    fn test_defaults() {
        let config = load(&with_dirs(&[])).expect("should load");
        assert_eq!(config.api_base.as_str(), "http://127.0.0.1:8000/api/");
        assert_eq!(config.default_user_id, "u1");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.query, QueryConfig::default());
        assert_eq!(config.settings_path, PathBuf::from("/tmp/shopsync/settings.json"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&with_dirs(&[
            ("SHOPSYNC_API_BASE", "https://shop.example.com/api"),
            ("SHOPSYNC_DEFAULT_USER", "guest"),
            ("SHOPSYNC_TIMEOUT_SECS", "5"),
            ("SHOPSYNC_KEEP_UNUSED_SECS", "120"),
            ("SHOPSYNC_STALE_SECS", "10"),
        ]))
        .expect("should load");

        assert_eq!(config.api_base.as_str(), "https://shop.example.com/api/");
        assert_eq!(config.default_user_id, "guest");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.query.keep_unused_for, Duration::from_secs(120));
        assert_eq!(config.query.stale_time, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&with_dirs(&[("SHOPSYNC_TIMEOUT_SECS", "  ")])).expect("should load");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&with_dirs(&[("SHOPSYNC_TIMEOUT_SECS", "soon")])).expect_err("should fail");
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "SHOPSYNC_TIMEOUT_SECS"));
    }

    #[test]
    fn test_invalid_base() {
        let err = load(&with_dirs(&[("SHOPSYNC_API_BASE", "ftp://shop/")])).expect_err("should fail");
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "SHOPSYNC_API_BASE"));

        assert!(load(&with_dirs(&[("SHOPSYNC_API_BASE", "not a url")])).is_err());
    }
}
