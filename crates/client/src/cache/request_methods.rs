//! The four store primitives the dispatcher is built from.
//!
//! Every store access holds the key's [`WriteGuard`](super::lock::WriteGuard).
//! Reads take their turn inline; writes and purges run as detached tasks, so
//! the caller never waits for the store and the guard is released on every
//! path the task can take.

use std::sync::Arc;

use reqcache_core::{Error, MetaRecord, Request, Response, Store};

use super::lock::RequestLocks;
use crate::options::RequestOptions;
use crate::query::Query;

/// A stored response and the outcome of reading its meta record.
pub(crate) struct CachedEntry {
    pub(crate) response: Response,
    pub(crate) meta: Result<Option<MetaRecord>, Error>,
}

pub(crate) struct RequestMethods<Q> {
    query: Arc<Q>,
    request_cache: Arc<dyn Store>,
    meta_cache: Arc<dyn Store>,
    locks: RequestLocks,
}

impl<Q> Clone for RequestMethods<Q> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            request_cache: self.request_cache.clone(),
            meta_cache: self.meta_cache.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<Q: Query> RequestMethods<Q> {
    pub(crate) fn new(
        query: Arc<Q>, request_cache: Arc<dyn Store>, meta_cache: Arc<dyn Store>, locks: RequestLocks,
    ) -> Self {
        Self { query, request_cache, meta_cache, locks }
    }

    pub(crate) fn query(&self) -> &Q {
        &self.query
    }

    /// Read the stored response for `request`.
    ///
    /// The lookup is queued on the key before this returns: writes queued
    /// earlier land first, writes queued later wait for the lookup. The
    /// returned future does not borrow `self` so it can run beside a fetch of
    /// the same key.
    pub(crate) fn get_cached_response(
        &self, request: &Request, options: &RequestOptions,
    ) -> impl Future<Output = Result<Option<Response>, Error>> + Send + use<Q> {
        let cancelled = options.ensure_not_cancelled();
        let turn = self.locks.acquire(&request.key());
        let request_cache = self.request_cache.clone();
        let request = request.clone();
        let signal = options.signal.clone();

        async move {
            cancelled?;
            let _turn = turn.await;
            let response = request_cache.lookup(&request).await?;
            if signal.is_some_and(|s| s.is_cancelled()) {
                return Err(Error::Cancelled);
            }
            Ok(response)
        }
    }

    /// Read the stored response for `request` together with its meta record,
    /// both within one turn on the key.
    ///
    /// A failed meta read is returned beside the response rather than failing
    /// the lookup.
    pub(crate) async fn get_cached_entry(
        &self, request: &Request, options: &RequestOptions,
    ) -> Result<Option<CachedEntry>, Error> {
        options.ensure_not_cancelled()?;
        let _turn = self.locks.acquire(&request.key()).await;
        let Some(response) = self.request_cache.lookup(request).await? else {
            options.ensure_not_cancelled()?;
            return Ok(None);
        };
        let meta = self.meta_cache.lookup(request).await.map(|meta| MetaRecord::parse(meta.as_ref()));
        options.ensure_not_cancelled()?;
        Ok(Some(CachedEntry { response, meta }))
    }

    /// Fetch `request` and store the response in the background.
    ///
    /// The store write is not tied to the call's cancellation signal.
    pub(crate) async fn fetch_and_cache_response(
        &self, request: &Request, options: &RequestOptions,
    ) -> Result<Response, Error> {
        options.ensure_not_cancelled()?;
        let response = self.query.fetch(request, options).await?;

        let guard = self.locks.acquire(&request.key());
        let request_cache = self.request_cache.clone();
        let meta_cache = self.meta_cache.clone();
        let request = request.clone();
        let stored = response.clone();

        tokio::spawn(async move {
            let _guard = guard.await;
            match store_pair(&request_cache, &meta_cache, &request, stored).await {
                Ok(()) => tracing::debug!(url = %request.url, "stored response in cache"),
                Err(e) => tracing::warn!(url = %request.url, error = %e, "failed to store response in cache"),
            }
        });

        Ok(response)
    }

    pub(crate) async fn parse_response(
        &self, response: Response, options: &RequestOptions,
    ) -> Result<Q::Output, Error> {
        options.ensure_not_cancelled()?;
        let value = self.query.parse_response(response).await?;
        options.ensure_not_cancelled()?;
        Ok(value)
    }

    /// Delete the entry pair of `request` in the background.
    pub(crate) fn purge_cache(&self, request: &Request) {
        let guard = self.locks.acquire(&request.key());
        let request_cache = self.request_cache.clone();
        let meta_cache = self.meta_cache.clone();
        let request = request.clone();

        tokio::spawn(async move {
            let _guard = guard.await;
            let (deleted, unstamped) = tokio::join!(request_cache.delete(&request), meta_cache.delete(&request));
            match deleted.and(unstamped) {
                Ok(_) => tracing::debug!(url = %request.url, "purged cache entry"),
                Err(e) => tracing::warn!(url = %request.url, error = %e, "failed to purge cache entry"),
            }
        });
    }
}

async fn store_pair(
    request_cache: &Arc<dyn Store>, meta_cache: &Arc<dyn Store>, request: &Request, response: Response,
) -> Result<(), Error> {
    tokio::try_join!(request_cache.put(request, response), meta_cache.put(request, MetaRecord::now().to_response()))?;
    Ok(())
}
