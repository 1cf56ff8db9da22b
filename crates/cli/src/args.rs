//! Command-line arguments.

use clap::Parser;
use reqcache_core::{AppConfig, CacheMethod};

/// Run a cached JSON request and print every value it delivers.
///
/// Configuration is read from REQCACHE_* environment variables and the TOML
/// file named by REQCACHE_CONFIG_FILE; flags given here take precedence.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// URL to request. The scheme defaults to https.
    pub url: String,

    /// HTTP method.
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,

    /// Request body, sent as-is. Part of the cache key.
    #[arg(long, short = 'd')]
    pub body: Option<String>,

    /// One of no-cache, no-cache-reload, cache-first, swr.
    #[arg(long)]
    pub cache_method: Option<CacheMethod>,

    /// Oldest cached entry cache-first may serve, in milliseconds.
    #[arg(long)]
    pub max_cache_age_ms: Option<u64>,

    /// Attempts before giving up.
    #[arg(long, default_value_t = 1)]
    pub retries: u32,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(method) = self.cache_method {
            config.cache_method = method;
        }
        if let Some(max_age) = self.max_cache_age_ms {
            config.max_cache_age_ms = Some(max_age);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["reqcache", "example.com/data"]).unwrap();
        assert_eq!(cli.url, "example.com/data");
        assert_eq!(cli.method, "GET");
        assert_eq!(cli.retries, 1);
        assert!(cli.cache_method.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "reqcache",
            "https://example.com",
            "--cache-method",
            "swr",
            "--max-cache-age-ms",
            "5000",
        ])
        .unwrap();

        let mut config = AppConfig { cache_method: CacheMethod::CacheFirst, ..Default::default() };
        cli.apply(&mut config);
        assert_eq!(config.cache_method, CacheMethod::Swr);
        assert_eq!(config.max_cache_age_ms, Some(5000));
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let cli = Cli::try_parse_from(["reqcache", "https://example.com"]).unwrap();
        let mut config = AppConfig { cache_method: CacheMethod::CacheFirst, ..Default::default() };
        cli.apply(&mut config);
        assert_eq!(config.cache_method, CacheMethod::CacheFirst);
    }

    #[test]
    fn test_rejects_unknown_cache_method() {
        let result = Cli::try_parse_from(["reqcache", "https://example.com", "--cache-method", "stale"]);
        assert!(result.is_err());
    }
}
