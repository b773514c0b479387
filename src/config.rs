//! Sync configuration
//!
//! Read from the process environment (and a `.env` file when present):
//!
//! | Variable | Default |
//! |---|---|
//! | `RETRODESK_REMOTE_URL` | unset (local-only mode) |
//! | `RETRODESK_API_TOKEN` | unset |
//! | `RETRODESK_CACHE_PATH` | `<data dir>/retrodesk/cache.db` |
//! | `RETRODESK_REQUEST_TIMEOUT_SECS` | 30 |
//! | `RETRODESK_POLL_INTERVAL_SECS` | 15 |
//! | `RETRODESK_HOT_CACHE_CAPACITY` | 256 |

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_HOT_CACHE_CAPACITY: u64 = 256;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the cloud document store; `None` means not configured
    pub remote_url: Option<Url>,

    /// Bearer token for the document store
    pub api_token: Option<String>,

    /// Location of the local cache database
    pub cache_path: PathBuf,

    pub request_timeout_secs: u64,

    /// How often HTTP subscriptions poll for changes
    pub poll_interval_secs: u64,

    /// Values kept in the in-memory layer of the local cache
    pub hot_cache_capacity: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_token: None,
            cache_path: default_cache_path(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            hot_cache_capacity: DEFAULT_HOT_CACHE_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Load from `.env` + environment
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment, test map, ...)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = non_empty(lookup("RETRODESK_REMOTE_URL")) {
            let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(raw.clone(), e))?;
            config.remote_url = Some(url);
        }

        config.api_token = non_empty(lookup("RETRODESK_API_TOKEN"));

        if let Some(path) = non_empty(lookup("RETRODESK_CACHE_PATH")) {
            config.cache_path = PathBuf::from(path);
        }

        if let Some(secs) = parse_u64(&lookup, "RETRODESK_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = secs;
        }
        if let Some(secs) = parse_u64(&lookup, "RETRODESK_POLL_INTERVAL_SECS")? {
            config.poll_interval_secs = secs;
        }
        if let Some(capacity) = parse_u64(&lookup, "RETRODESK_HOT_CACHE_CAPACITY")? {
            config.hot_cache_capacity = capacity;
        }

        Ok(config)
    }

    pub fn remote_configured(&self) -> bool {
        self.remote_url.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

fn default_cache_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("retrodesk")
        .join("cache.db")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(key.to_string(), raw)),
        None => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid remote URL '{0}': {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("Invalid number for {0}: '{1}'")]
    InvalidNumber(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_local_only() {
        let config = SyncConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(!config.remote_configured());
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.poll_interval_secs, 15);
        assert!(config.cache_path.ends_with("retrodesk/cache.db"));
    }

    #[test]
    fn test_values_are_read() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("RETRODESK_REMOTE_URL", "https://store.example.com/api"),
            ("RETRODESK_API_TOKEN", "tok"),
            ("RETRODESK_CACHE_PATH", "/tmp/rd.db"),
            ("RETRODESK_POLL_INTERVAL_SECS", "3"),
        ]))
        .unwrap();

        assert!(config.remote_configured());
        assert_eq!(config.api_token.as_deref(), Some("tok"));
        assert_eq!(config.cache_path, PathBuf::from("/tmp/rd.db"));
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config =
            SyncConfig::from_lookup(lookup_from(&[("RETRODESK_REMOTE_URL", "   ")])).unwrap();
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            SyncConfig::from_lookup(lookup_from(&[("RETRODESK_REMOTE_URL", "not a url")])),
            Err(ConfigError::InvalidUrl(..))
        ));
        assert!(matches!(
            SyncConfig::from_lookup(lookup_from(&[("RETRODESK_REQUEST_TIMEOUT_SECS", "soon")])),
            Err(ConfigError::InvalidNumber(..))
        ));
    }
}
