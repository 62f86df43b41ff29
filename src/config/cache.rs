use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ConfigError;

/// Who shares a cached page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// Keyed by URL and caller identity
    #[default]
    User,
    /// Keyed by URL alone, shared by every caller
    Shared,
}

/// Page cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub scope: CacheScope,

    /// Lifetime of a cached page in seconds; absent or negative never expires
    pub timeout_secs: Option<i64>,

    /// Also write pages to the durable store
    pub persist: bool,

    /// Serve an expired page when the origin times out
    pub serve_expired_on_timeout: bool,

    /// Seconds a stale page keeps being served after a timeout before the
    /// origin is tried again; only positive values re-store the page
    pub retry_delay_secs: Option<i64>,

    /// In-memory capacity (default: 1000)
    pub max_entries: usize,

    /// SQLite file for persisted pages (default when `persist` is set:
    /// `<data dir>/webproxy/cache.db`)
    pub db_path: Option<PathBuf>,

    /// Let concurrent misses on one key wait for a single fetch (default: true)
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scope: CacheScope::User,
            timeout_secs: None,
            persist: false,
            serve_expired_on_timeout: false,
            retry_delay_secs: None,
            max_entries: 1000,
            db_path: None,
            single_flight: true,
        }
    }
}

impl CacheConfig {
    /// Lifetime for freshly captured pages, `None` meaning no expiry.
    pub fn entry_lifetime(&self) -> Result<Option<chrono::Duration>, ConfigError> {
        self.timeout_secs
            .filter(|secs| *secs >= 0)
            .map(|secs| seconds("cache.timeout_secs", secs))
            .transpose()
    }

    /// Window during which a stale page is re-served after a timeout.
    pub fn retry_delay(&self) -> Result<Option<chrono::Duration>, ConfigError> {
        self.retry_delay_secs
            .filter(|secs| *secs > 0)
            .map(|secs| seconds("cache.retry_delay_secs", secs))
            .transpose()
    }
}

fn seconds(key: &str, secs: i64) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::try_seconds(secs)
        .ok_or_else(|| ConfigError::Invalid(format!("{} = {} is out of range", key, secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_timeout_never_expires() {
        let config = CacheConfig {
            timeout_secs: Some(-1),
            ..Default::default()
        };
        assert_eq!(config.entry_lifetime().unwrap(), None);

        let config = CacheConfig {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.entry_lifetime().unwrap(), Some(chrono::Duration::zero()));
    }

    #[test]
    fn test_out_of_range_seconds_are_rejected() {
        let config = CacheConfig {
            timeout_secs: Some(i64::MAX),
            retry_delay_secs: Some(i64::MAX),
            ..Default::default()
        };
        assert!(matches!(config.entry_lifetime(), Err(ConfigError::Invalid(_))));
        assert!(matches!(config.retry_delay(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_retry_delay_must_be_positive() {
        let mut config = CacheConfig::default();
        assert_eq!(config.retry_delay().unwrap(), None);

        config.retry_delay_secs = Some(0);
        assert_eq!(config.retry_delay().unwrap(), None);

        config.retry_delay_secs = Some(60);
        assert_eq!(config.retry_delay().unwrap(), Some(chrono::Duration::seconds(60)));
    }
}
