//! Cache lifecycle: versioned store names, opening, and startup cleanup.
//!
//! Each cache consists of two stores addressed by the same request keys: the
//! request store holding response bodies and the meta store holding the
//! [`MetaRecord`] of each entry. Store names carry a version; opening a new
//! version deletes every other version under the same prefix and drops
//! entries that are orphaned or older than the configured maximum age.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use reqcache_core::{AppConfig, Error, MetaRecord, Request, Storage, Store, is_fresh};

pub const REQUEST_CACHE_BASE_KEY: &str = "requestCache";
pub const META_CACHE_BASE_KEY: &str = "metaCache";

/// Options for [`initialize_cache`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub version: String,
    pub name_prefix: Option<String>,
    pub max_cache_age: Option<Duration>,
}

impl CacheOptions {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), name_prefix: None, max_cache_age: None }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn with_max_cache_age(mut self, max_age: Duration) -> Self {
        self.max_cache_age = Some(max_age);
        self
    }
}

impl From<&AppConfig> for CacheOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            version: config.cache_version.clone(),
            name_prefix: config.cache_name_prefix.clone().filter(|p| !p.is_empty()),
            max_cache_age: config.max_cache_age(),
        }
    }
}

/// Store names for one prefix and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    request_base: String,
    meta_base: String,
    version: String,
}

impl CacheNames {
    /// An empty prefix is the same as none.
    pub fn new(prefix: Option<&str>, version: &str) -> Self {
        let prefix = prefix.filter(|p| !p.is_empty()).map(|p| format!("{p}-")).unwrap_or_default();
        Self {
            request_base: format!("{prefix}{REQUEST_CACHE_BASE_KEY}"),
            meta_base: format!("{prefix}{META_CACHE_BASE_KEY}"),
            version: version.to_string(),
        }
    }

    /// Name of the request store, e.g. `weather-requestCache-v1`.
    pub fn request_cache(&self) -> String {
        format!("{}-{}", self.request_base, self.version)
    }

    /// Name of the meta store, e.g. `weather-metaCache-v1`.
    pub fn meta_cache(&self) -> String {
        format!("{}-{}", self.meta_base, self.version)
    }

    /// Whether `name` is a store of this prefix with a different version.
    pub fn is_stale(&self, name: &str) -> bool {
        [&self.request_base, &self.meta_base].into_iter().any(|base| {
            name.strip_prefix(base.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|version| version != self.version)
        })
    }
}

/// What startup cleanup removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Names of deleted stores belonging to other versions.
    pub stale_stores: Vec<String>,
    /// Number of entries deleted from the current stores.
    pub purged_entries: usize,
}

/// Resolves once startup cleanup has finished.
///
/// Cloning is cheap; every clone resolves to the same report.
#[derive(Clone)]
pub struct CleanupSignal {
    inner: Shared<BoxFuture<'static, CleanupReport>>,
}

impl CleanupSignal {
    /// A signal that resolves when `future` completes.
    pub fn new(future: impl Future<Output = CleanupReport> + Send + 'static) -> Self {
        Self { inner: future.boxed().shared() }
    }

    /// A signal that is already resolved.
    pub fn ready() -> Self {
        Self::new(futures_util::future::ready(CleanupReport::default()))
    }

    /// Wait for cleanup to finish.
    pub async fn wait(&self) -> CleanupReport {
        self.inner.clone().await
    }

    /// Whether cleanup has already finished.
    pub fn is_done(&self) -> bool {
        self.inner.peek().is_some()
    }
}

impl std::fmt::Debug for CleanupSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupSignal").field("done", &self.is_done()).finish()
    }
}

/// The two open stores of a cache plus its cleanup signal.
#[derive(Clone)]
pub struct CacheHandles {
    pub request_cache: Arc<dyn Store>,
    pub meta_cache: Arc<dyn Store>,
    pub cleanup: CleanupSignal,
    /// Default age limit for `cache-first` hits.
    pub max_cache_age: Option<Duration>,
}

impl CacheHandles {
    /// Handles for already opened stores that need no cleanup.
    pub fn new(request_cache: Arc<dyn Store>, meta_cache: Arc<dyn Store>) -> Self {
        Self { request_cache, meta_cache, cleanup: CleanupSignal::ready(), max_cache_age: None }
    }

    /// Wait for startup cleanup and return what it removed.
    pub async fn cleanup_report(&self) -> CleanupReport {
        self.cleanup.wait().await
    }
}

/// Open the versioned request and meta stores and start cleanup.
///
/// Cleanup runs as a background task; every read and write made through
/// [`RequestCache`](crate::RequestCache) waits for it first. A failed
/// cleanup is logged and still resolves the signal.
pub async fn initialize_cache(storage: Arc<dyn Storage>, options: CacheOptions) -> Result<CacheHandles, Error> {
    let names = CacheNames::new(options.name_prefix.as_deref(), &options.version);

    let request_cache = storage.open(&names.request_cache()).await?;
    let meta_cache = storage.open(&names.meta_cache()).await?;

    tracing::debug!(
        request_cache = %request_cache.name(),
        meta_cache = %meta_cache.name(),
        "opened caches"
    );

    let task = tokio::spawn(cleanup(
        storage,
        names,
        request_cache.clone(),
        meta_cache.clone(),
        options.max_cache_age,
    ));
    let cleanup = CleanupSignal::new(async move {
        match task.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "cache cleanup failed");
                CleanupReport::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "cache cleanup task aborted");
                CleanupReport::default()
            }
        }
    });

    Ok(CacheHandles { request_cache, meta_cache, cleanup, max_cache_age: options.max_cache_age })
}

async fn cleanup(
    storage: Arc<dyn Storage>, names: CacheNames, request_cache: Arc<dyn Store>, meta_cache: Arc<dyn Store>,
    max_cache_age: Option<Duration>,
) -> Result<CleanupReport, Error> {
    let stale_stores: Vec<String> = storage
        .keys()
        .await?
        .into_iter()
        .filter(|name| names.is_stale(name))
        .collect();

    // No handle is open on other versions, so their deletion cannot race the entry purge.
    let deletions = stale_stores.iter().map(|name| {
        let storage = storage.clone();
        async move {
            if let Err(e) = storage.delete(name).await {
                tracing::warn!(store = %name, error = %e, "failed to delete stale cache");
            }
        }
    });

    let (_, purged_entries) =
        tokio::join!(join_all(deletions), purge_stale_entries(&request_cache, &meta_cache, max_cache_age));
    let purged_entries = purged_entries?;

    tracing::info!(stale_stores = stale_stores.len(), purged_entries, "cache cleanup finished");

    Ok(CleanupReport { stale_stores, purged_entries })
}

/// Delete entry pairs that are orphaned, carry no readable meta record, or
/// are older than `max_cache_age`.
async fn purge_stale_entries(
    request_cache: &Arc<dyn Store>, meta_cache: &Arc<dyn Store>, max_cache_age: Option<Duration>,
) -> Result<usize, Error> {
    let mut seen = HashSet::new();
    let requests: Vec<Request> = meta_cache
        .keys()
        .await?
        .into_iter()
        .chain(request_cache.keys().await?)
        .filter(|request| seen.insert(request.key()))
        .collect();

    let checks = requests
        .iter()
        .map(|request| purge_if_stale(request_cache, meta_cache, request, max_cache_age));

    let mut purged = 0;
    for result in join_all(checks).await {
        match result {
            Ok(true) => purged += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "failed to check cache entry during cleanup"),
        }
    }
    Ok(purged)
}

/// Delete the pair for `request` if it should not be served. Returns whether it was deleted.
async fn purge_if_stale(
    request_cache: &Arc<dyn Store>, meta_cache: &Arc<dyn Store>, request: &Request, max_cache_age: Option<Duration>,
) -> Result<bool, Error> {
    let (response, meta) = tokio::join!(request_cache.lookup(request), meta_cache.lookup(request));
    let response = response?;
    let meta = MetaRecord::parse(meta?.as_ref());

    let keep = response.is_some() && meta.is_some_and(|meta| is_fresh(Some(&meta), max_cache_age));
    if keep {
        return Ok(false);
    }

    let (deleted, unstamped) = tokio::join!(request_cache.delete(request), meta_cache.delete(request));
    deleted?;
    unstamped?;
    tracing::debug!(url = %request.url, "purged stale cache entry");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqcache_core::{MemoryStorage, Response};

    fn request(body: &str) -> Request {
        Request::parse("POST", "http://test.url").unwrap().with_body(body.to_string())
    }

    fn stamped(minutes_ago: i64) -> Response {
        MetaRecord { date: chrono::Utc::now() - chrono::Duration::minutes(minutes_ago) }.to_response()
    }

    #[test]
    fn test_cache_names() {
        let plain = CacheNames::new(None, "v1");
        assert_eq!(plain.request_cache(), "requestCache-v1");
        assert_eq!(plain.meta_cache(), "metaCache-v1");

        let prefixed = CacheNames::new(Some("weather"), "v2");
        assert_eq!(prefixed.request_cache(), "weather-requestCache-v2");
        assert_eq!(prefixed.meta_cache(), "weather-metaCache-v2");
    }

    #[test]
    fn test_empty_prefix_is_unprefixed() {
        let names = CacheNames::new(Some(""), "v1");
        assert_eq!(names.request_cache(), "requestCache-v1");
        assert_eq!(names.meta_cache(), "metaCache-v1");
        assert!(names.is_stale("requestCache-v0"));
    }

    #[test]
    fn test_stale_names() {
        let names = CacheNames::new(None, "v2");
        assert!(names.is_stale("requestCache-v1"));
        assert!(names.is_stale("metaCache-v1"));
        assert!(!names.is_stale("requestCache-v2"));
        assert!(!names.is_stale("custom-requestCache-v1"));
        assert!(!names.is_stale("unrelated"));

        let prefixed = CacheNames::new(Some("custom"), "v2");
        assert!(prefixed.is_stale("custom-requestCache-v1"));
        assert!(!prefixed.is_stale("requestCache-v1"));
        assert!(!prefixed.is_stale("other-metaCache-v1"));
    }

    #[tokio::test]
    async fn test_initialize_opens_versioned_stores() {
        let storage = Arc::new(MemoryStorage::new());
        let handles = initialize_cache(storage.clone(), CacheOptions::new("v1")).await.unwrap();
        handles.cleanup_report().await;

        assert_eq!(handles.request_cache.name(), "requestCache-v1");
        assert_eq!(handles.meta_cache.name(), "metaCache-v1");
        assert_eq!(storage.keys().await.unwrap(), vec!["requestCache-v1".to_string(), "metaCache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_new_version_deletes_old_stores() {
        let storage = Arc::new(MemoryStorage::new());
        let v1 = initialize_cache(storage.clone(), CacheOptions::new("v1")).await.unwrap();
        v1.cleanup_report().await;
        v1.request_cache.put(&request("a"), Response::new("body")).await.unwrap();
        v1.meta_cache.put(&request("a"), MetaRecord::now().to_response()).await.unwrap();

        let v2 = initialize_cache(storage.clone(), CacheOptions::new("v2")).await.unwrap();
        let report = v2.cleanup_report().await;

        assert_eq!(report.stale_stores, vec!["requestCache-v1".to_string(), "metaCache-v1".to_string()]);
        assert_eq!(storage.keys().await.unwrap(), vec!["requestCache-v2".to_string(), "metaCache-v2".to_string()]);
        assert!(v2.request_cache.lookup(&request("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_prefixes_survive_cleanup() {
        let storage = Arc::new(MemoryStorage::new());
        let custom = initialize_cache(storage.clone(), CacheOptions::new("v1").with_name_prefix("custom"))
            .await
            .unwrap();
        custom.cleanup_report().await;

        let other = initialize_cache(storage.clone(), CacheOptions::new("v2").with_name_prefix("other"))
            .await
            .unwrap();
        let report = other.cleanup_report().await;

        assert!(report.stale_stores.is_empty());
        assert_eq!(storage.keys().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_cleanup_purges_expired_and_orphaned_entries() {
        let storage = Arc::new(MemoryStorage::new());
        let requests = storage.open("requestCache-v1").await.unwrap();
        let meta = storage.open("metaCache-v1").await.unwrap();

        // fresh pair
        requests.put(&request("fresh"), Response::new("1")).await.unwrap();
        meta.put(&request("fresh"), stamped(1)).await.unwrap();
        // expired pair
        requests.put(&request("old"), Response::new("2")).await.unwrap();
        meta.put(&request("old"), stamped(120)).await.unwrap();
        // meta without response
        meta.put(&request("no-body"), stamped(1)).await.unwrap();
        // response without meta
        requests.put(&request("no-meta"), Response::new("3")).await.unwrap();
        // unreadable meta
        requests.put(&request("bad-meta"), Response::new("4")).await.unwrap();
        meta.put(&request("bad-meta"), Response::new("not json")).await.unwrap();

        let options = CacheOptions::new("v1").with_max_cache_age(Duration::from_secs(3600));
        let handles = initialize_cache(storage.clone(), options).await.unwrap();
        let report = handles.cleanup_report().await;

        assert_eq!(report.purged_entries, 4);
        assert_eq!(requests.keys().await.unwrap(), vec![request("fresh")]);
        assert_eq!(meta.keys().await.unwrap(), vec![request("fresh")]);
    }

    #[tokio::test]
    async fn test_cleanup_without_max_age_keeps_old_entries() {
        let storage = Arc::new(MemoryStorage::new());
        let requests = storage.open("requestCache-v1").await.unwrap();
        let meta = storage.open("metaCache-v1").await.unwrap();
        requests.put(&request("old"), Response::new("2")).await.unwrap();
        meta.put(&request("old"), stamped(60 * 24 * 365)).await.unwrap();

        let handles = initialize_cache(storage, CacheOptions::new("v1")).await.unwrap();
        let report = handles.cleanup_report().await;

        assert_eq!(report.purged_entries, 0);
        assert!(requests.lookup(&request("old")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_initialize_twice_keeps_entries() {
        let storage = Arc::new(MemoryStorage::new());
        let first = initialize_cache(storage.clone(), CacheOptions::new("v1")).await.unwrap();
        first.cleanup_report().await;
        first.request_cache.put(&request("a"), Response::new("body")).await.unwrap();
        first.meta_cache.put(&request("a"), MetaRecord::now().to_response()).await.unwrap();

        let second = initialize_cache(storage.clone(), CacheOptions::new("v1")).await.unwrap();
        let report = second.cleanup_report().await;

        assert_eq!(report, CleanupReport::default());
        assert_eq!(second.request_cache.keys().await.unwrap(), vec![request("a")]);
        assert_eq!(second.meta_cache.keys().await.unwrap(), vec![request("a")]);
        assert_eq!(storage.keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_signal_ready() {
        let signal = CleanupSignal::ready();
        assert_eq!(signal.wait().await, CleanupReport::default());
        assert!(signal.is_done());
    }

    #[test]
    fn test_options_from_config() {
        let config = AppConfig {
            cache_version: "v3".into(),
            cache_name_prefix: Some(String::new()),
            max_cache_age_ms: Some(500),
            ..Default::default()
        };
        let options = CacheOptions::from(&config);
        assert_eq!(options.version, "v3");
        assert!(options.name_prefix.is_none());
        assert_eq!(options.max_cache_age, Some(Duration::from_millis(500)));
    }
}
