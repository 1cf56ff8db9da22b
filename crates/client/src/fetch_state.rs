//! Progress of a query as seen by a consumer.

use reqcache_core::Error;

use crate::cache::Delivery;

#[derive(Debug, Default)]
pub enum FetchState<T> {
    /// Nothing requested yet.
    #[default]
    Initial,
    Loading,
    Success {
        result: T,
        /// The result came from the cache and a fresh one may follow.
        stale: bool,
    },
    Failure(Error),
}

impl<T> FetchState<T> {
    pub fn success(result: T) -> Self {
        FetchState::Success { result, stale: false }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, FetchState::Initial)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchState::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchState::Failure(_))
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            FetchState::Success { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            FetchState::Failure(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> From<Delivery<T>> for FetchState<T> {
    fn from(delivery: Delivery<T>) -> Self {
        FetchState::Success { result: delivery.value, stale: delivery.stale }
    }
}

impl<T> From<Error> for FetchState<T> {
    fn from(error: Error) -> Self {
        FetchState::Failure(error)
    }
}
