//! Per-call options shared by queries and the cache engine.

use std::time::Duration;

use reqcache_core::{CacheMethod, Error};
use tokio_util::sync::CancellationToken;

/// Options for one cached query call.
///
/// Values left unset fall back to the defaults given when the query was
/// wrapped (see [`RequestCache::cache`](crate::RequestCache::cache)).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Cache strategy for this call. Defaults to `no-cache`.
    pub cache_method: Option<CacheMethod>,
    /// Maximum age of a cached entry `cache-first` may serve.
    pub max_cache_age: Option<Duration>,
    /// Cancels the call's cache reads, parses and fetch.
    pub signal: Option<CancellationToken>,
    /// Extra headers queries add to the requests they build.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_method(mut self, method: CacheMethod) -> Self {
        self.cache_method = Some(method);
        self
    }

    pub fn with_max_cache_age(mut self, max_age: Duration) -> Self {
        self.max_cache_age = Some(max_age);
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Fail with [`Error::Cancelled`] if the signal has been triggered.
    pub fn ensure_not_cancelled(&self) -> Result<(), Error> {
        match &self.signal {
            Some(signal) if signal.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// These options with unset values taken from `defaults`.
    ///
    /// Headers from both are kept, defaults first.
    pub(crate) fn merged_over(self, defaults: &RequestOptions) -> RequestOptions {
        let mut headers = defaults.headers.clone();
        headers.extend(self.headers);
        RequestOptions {
            cache_method: self.cache_method.or(defaults.cache_method),
            max_cache_age: self.max_cache_age.or(defaults.max_cache_age),
            signal: self.signal.or_else(|| defaults.signal.clone()),
            headers,
        }
    }
}
