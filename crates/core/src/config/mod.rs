//! Cache and HTTP settings, merged by figment from defaults, an optional TOML
//! file and `REQCACHE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::CacheMethod;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (REQCACHE_*)
/// 2. TOML config file (if REQCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via REQCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Version suffix of the cache names. Changing it discards every
    /// entry stored under the previous version.
    ///
    /// Set via REQCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Optional namespace for the cache names.
    ///
    /// Set via REQCACHE_CACHE_NAME_PREFIX environment variable.
    #[serde(default)]
    pub cache_name_prefix: Option<String>,

    /// Entries older than this are dropped at startup and skipped by
    /// `cache-first`. Unset means entries never expire.
    ///
    /// Set via REQCACHE_MAX_CACHE_AGE_MS environment variable.
    #[serde(default)]
    pub max_cache_age_ms: Option<u64>,

    /// Cache method used when a call does not pick one.
    ///
    /// Set via REQCACHE_CACHE_METHOD environment variable.
    #[serde(default)]
    pub cache_method: CacheMethod,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via REQCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via REQCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via REQCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./reqcache.sqlite")
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_user_agent() -> String {
    "reqcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_version: default_cache_version(),
            cache_name_prefix: None,
            max_cache_age_ms: None,
            cache_method: CacheMethod::default(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Maximum cache age as Duration, if one is configured.
    pub fn max_cache_age(&self) -> Option<Duration> {
        self.max_cache_age_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `REQCACHE_`
    /// 2. TOML file from `REQCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("REQCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("REQCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./reqcache.sqlite"));
        assert_eq!(config.cache_version, "v1");
        assert!(config.cache_name_prefix.is_none());
        assert!(config.max_cache_age_ms.is_none());
        assert_eq!(config.cache_method, CacheMethod::NoCache);
        assert_eq!(config.user_agent, "reqcache/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_bytes, 5_242_880);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_max_cache_age_duration() {
        let config = AppConfig { max_cache_age_ms: Some(60_000), ..Default::default() };
        assert_eq!(config.max_cache_age(), Some(Duration::from_secs(60)));
        assert_eq!(AppConfig::default().max_cache_age(), None);
    }

    #[test]
    fn test_load_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("REQCACHE_CACHE_VERSION", "v7");
            jail.set_env("REQCACHE_CACHE_METHOD", "swr");
            jail.set_env("REQCACHE_MAX_CACHE_AGE_MS", "1000");
            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.cache_version, "v7");
            assert_eq!(config.cache_method, CacheMethod::Swr);
            assert_eq!(config.max_cache_age_ms, Some(1000));
            Ok(())
        });
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("reqcache.toml", "cache_name_prefix = \"weather\"\ntimeout_ms = 5000\n")?;
            jail.set_env("REQCACHE_CONFIG_FILE", "reqcache.toml");
            jail.set_env("REQCACHE_TIMEOUT_MS", "7000");
            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.cache_name_prefix.as_deref(), Some("weather"));
            assert_eq!(config.timeout_ms, 7000);
            Ok(())
        });
    }
}
