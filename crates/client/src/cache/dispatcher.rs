//! Cache-method dispatch and delivery of results.
//!
//! A [`CachedQuery`] call produces a [`CacheResponse`]: a lazy sequence of at
//! most two [`Delivery`] values. Only `swr` with a readable cached entry
//! produces two, the stale one first.

use std::sync::Arc;
use std::time::Duration;

use reqcache_core::{CacheMethod, Error, Request, Response, is_fresh};
use tokio::sync::mpsc;

use super::initialize::CacheHandles;
use super::lock::RequestLocks;
use super::request_methods::RequestMethods;
use crate::options::RequestOptions;
use crate::query::Query;

/// One value produced by a cached query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<T> {
    pub value: T,
    /// Whether the value came from the cache while a fresh one is on its way.
    pub stale: bool,
}

/// Wraps queries with caching over one pair of stores.
///
/// All queries wrapped by the same `RequestCache` share its write locks.
/// Build one per initialized cache and share it.
#[derive(Clone)]
pub struct RequestCache {
    handles: CacheHandles,
    locks: RequestLocks,
}

impl RequestCache {
    pub fn new(handles: CacheHandles) -> Self {
        let locks = RequestLocks::new(handles.cleanup.clone());
        Self { handles, locks }
    }

    pub fn handles(&self) -> &CacheHandles {
        &self.handles
    }

    /// Wrap `query`. `defaults` apply to every call unless the call overrides them.
    pub fn cache<Q: Query>(&self, query: Arc<Q>, defaults: RequestOptions) -> CachedQuery<Q> {
        let methods = RequestMethods::new(
            query,
            self.handles.request_cache.clone(),
            self.handles.meta_cache.clone(),
            self.locks.clone(),
        );
        CachedQuery { methods, defaults, max_cache_age: self.handles.max_cache_age }
    }

    /// Wait for every background write and purge started so far.
    pub async fn settle(&self) {
        self.locks.settle().await;
    }
}

/// A query wrapped by a [`RequestCache`].
pub struct CachedQuery<Q> {
    methods: RequestMethods<Q>,
    defaults: RequestOptions,
    max_cache_age: Option<Duration>,
}

impl<Q> Clone for CachedQuery<Q> {
    fn clone(&self) -> Self {
        Self { methods: self.methods.clone(), defaults: self.defaults.clone(), max_cache_age: self.max_cache_age }
    }
}

impl<Q: Query> CachedQuery<Q> {
    /// Prepare a call. Nothing runs until the response is consumed.
    pub fn call(&self, params: Q::Params, options: RequestOptions) -> CacheResponse<Q> {
        CacheResponse {
            methods: self.methods.clone(),
            params,
            options: options.merged_over(&self.defaults),
            max_cache_age: self.max_cache_age,
        }
    }
}

/// The pending result of one [`CachedQuery::call`].
pub struct CacheResponse<Q: Query> {
    methods: RequestMethods<Q>,
    params: Q::Params,
    options: RequestOptions,
    max_cache_age: Option<Duration>,
}

impl<Q: Query> CacheResponse<Q> {
    /// Run the call, handing each value to `on_value` as soon as it is ready.
    ///
    /// Fails if any step fails, including after a stale value was delivered.
    pub async fn subscribe<F>(self, mut on_value: F) -> Result<(), Error>
    where
        F: FnMut(Delivery<Q::Output>),
    {
        let (sender, mut receiver) = mpsc::channel(2);
        let consume = async {
            while let Some(delivery) = receiver.recv().await {
                on_value(delivery);
            }
        };
        let (produced, ()) = tokio::join!(self.produce(sender), consume);
        produced
    }

    /// Run the call and gather every delivered value.
    pub async fn collect(self) -> Result<Vec<Delivery<Q::Output>>, Error> {
        let mut deliveries = Vec::with_capacity(2);
        self.subscribe(|delivery| deliveries.push(delivery)).await?;
        Ok(deliveries)
    }

    async fn produce(self, sender: mpsc::Sender<Delivery<Q::Output>>) -> Result<(), Error> {
        let Self { methods, params, options, max_cache_age } = self;
        options.ensure_not_cancelled()?;

        let cache_method = options.cache_method.unwrap_or_default();
        let max_cache_age = options.max_cache_age.or(max_cache_age);
        let request = methods.query().create_request(&params, &options)?;

        tracing::debug!(cache_method = %cache_method, url = %request.url, "dispatching cached query");

        let value = match cache_method {
            CacheMethod::NoCache => methods.query().call(&params, &options).await?,
            CacheMethod::NoCacheReload => fetch_fresh(&methods, &request, &options).await?,
            CacheMethod::CacheFirst => match read_fresh_hit(&methods, &request, &options, max_cache_age).await? {
                Some(value) => value,
                None => fetch_fresh(&methods, &request, &options).await?,
            },
            CacheMethod::Swr => {
                // The read is queued first so the write this fetch queues lands after the lookup.
                let cached = methods.get_cached_response(&request, &options);
                let fetched = methods.fetch_and_cache_response(&request, &options);

                let deliver_stale = async {
                    let Some(response) = cached.await? else {
                        tracing::debug!(url = %request.url, "cache miss");
                        return Ok(());
                    };
                    if let Some(value) = parse_cache_hit(&methods, &request, response, &options).await? {
                        let _ = sender.send(Delivery { value, stale: true }).await;
                    }
                    Ok::<_, Error>(())
                };

                let (stale, fetched) = tokio::join!(deliver_stale, fetched);
                stale?;
                parse_fresh(&methods, &request, fetched?, &options).await?
            }
        };

        let _ = sender.send(Delivery { value, stale: false }).await;
        Ok(())
    }
}

async fn fetch_fresh<Q: Query>(
    methods: &RequestMethods<Q>, request: &Request, options: &RequestOptions,
) -> Result<Q::Output, Error> {
    let response = methods.fetch_and_cache_response(request, options).await?;
    parse_fresh(methods, request, response, options).await
}

/// Parse a freshly fetched response, purging its entry if it is unreadable.
async fn parse_fresh<Q: Query>(
    methods: &RequestMethods<Q>, request: &Request, response: Response, options: &RequestOptions,
) -> Result<Q::Output, Error> {
    match methods.parse_response(response, options).await {
        Ok(value) => Ok(value),
        Err(e) => {
            if !e.is_cancelled() {
                tracing::warn!(url = %request.url, error = %e, "fresh response unreadable, purging cache entry");
                methods.purge_cache(request);
            }
            Err(e)
        }
    }
}

/// The cached value for `request` if it exists, carries a meta record and is
/// younger than `max_cache_age`.
async fn read_fresh_hit<Q: Query>(
    methods: &RequestMethods<Q>, request: &Request, options: &RequestOptions, max_cache_age: Option<Duration>,
) -> Result<Option<Q::Output>, Error> {
    let Some(entry) = methods.get_cached_entry(request, options).await? else {
        tracing::debug!(url = %request.url, "cache miss");
        return Ok(None);
    };

    let meta = match entry.meta {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(url = %request.url, error = %e, "failed to read cache meta");
            return Ok(None);
        }
    };
    let Some(meta) = meta else {
        tracing::debug!(url = %request.url, "cache hit without meta record");
        return Ok(None);
    };
    if !is_fresh(Some(&meta), max_cache_age) {
        tracing::debug!(url = %request.url, age_ms = meta.age().as_millis() as u64, "cache hit expired");
        return Ok(None);
    }

    parse_cache_hit(methods, request, entry.response, options).await
}

/// Parse a cached response. An unreadable entry counts as a miss; it is
/// replaced by the next successful fetch rather than purged here.
async fn parse_cache_hit<Q: Query>(
    methods: &RequestMethods<Q>, request: &Request, response: Response, options: &RequestOptions,
) -> Result<Option<Q::Output>, Error> {
    match methods.parse_response(response, options).await {
        Ok(value) => {
            tracing::debug!(url = %request.url, "cache hit");
            Ok(Some(value))
        }
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            tracing::warn!(url = %request.url, error = %e, "cached response unreadable, treating as miss");
            Ok(None)
        }
    }
}
