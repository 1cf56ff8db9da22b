//! Caching engine over a pair of request and meta stores.

mod dispatcher;
mod initialize;
mod lock;
mod request_methods;

pub use dispatcher::{CacheResponse, CachedQuery, Delivery, RequestCache};
pub use initialize::{
    CacheHandles, CacheNames, CacheOptions, CleanupReport, CleanupSignal, META_CACHE_BASE_KEY, REQUEST_CACHE_BASE_KEY,
    initialize_cache,
};
pub use lock::{RequestLocks, WriteGuard};
