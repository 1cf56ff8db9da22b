//! Request caching for reqcache.
//!
//! This crate provides the caching engine (versioned stores, per-key write
//! locks, the four cache methods), the [`Query`] trait with an HTTP-backed
//! [`JsonQuery`], and the retry, backoff and fetch-state helpers used by the
//! CLI.

pub mod backoff;
pub mod cache;
pub mod fetch;
pub mod fetch_state;
pub mod options;
pub mod query;
pub mod retry;

pub use backoff::Backoff;
pub use cache::{
    CacheHandles, CacheNames, CacheOptions, CacheResponse, CachedQuery, CleanupReport, CleanupSignal, Delivery,
    RequestCache, initialize_cache,
};
pub use fetch::{FetchConfig, HttpFetcher, canonical_request, canonicalize};
pub use fetch_state::FetchState;
pub use options::RequestOptions;
pub use query::{JsonQuery, Query};
pub use retry::{RetryOptions, retry};
