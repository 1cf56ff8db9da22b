//! Per-request-key write serialization.
//!
//! Every background write or purge of a key holds a [`WriteGuard`] for its
//! whole duration, and so does every cache lookup. Acquiring registers the
//! holder synchronously, so anything that arrives afterwards queues behind
//! it, even before the holder itself has been granted the key. A write queued
//! after a lookup therefore cannot land before that lookup has read the store. The table lives as long as the
//! [`RequestCache`](crate::RequestCache) that created it; two caches built
//! from separate initializations do not share locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use tokio::sync::oneshot;

use super::initialize::CleanupSignal;

/// Resolves once a writer and everything queued before it have finished.
type Released = Shared<BoxFuture<'static, ()>>;

struct Pending {
    id: u64,
    released: Released,
}

type Table = Arc<Mutex<HashMap<String, Pending>>>;

fn lock_table(table: &Table) -> MutexGuard<'_, HashMap<String, Pending>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keyed write locks gated on startup cleanup.
#[derive(Clone)]
pub struct RequestLocks {
    cleanup: CleanupSignal,
    pending: Table,
    next_id: Arc<AtomicU64>,
}

impl RequestLocks {
    pub fn new(cleanup: CleanupSignal) -> Self {
        Self { cleanup, pending: Arc::default(), next_id: Arc::new(AtomicU64::new(0)) }
    }

    /// Queue for `key`.
    ///
    /// The caller is registered before this returns; the returned future
    /// resolves once cleanup has finished and every earlier holder of the key
    /// has released. Dropping the future or the guard releases the key.
    pub fn acquire(&self, key: &str) -> impl Future<Output = WriteGuard> + Send + use<> {
        let (sender, receiver) = oneshot::channel::<()>();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = {
            let mut pending = lock_table(&self.pending);
            let previous = pending.get(key).map(|p| p.released.clone());
            let queued_behind = previous.clone();
            let released = async move {
                if let Some(previous) = queued_behind {
                    previous.await;
                }
                let _ = receiver.await;
            }
            .boxed()
            .shared();
            pending.insert(key.to_string(), Pending { id, released });
            previous
        };

        let pending = self.pending.clone();
        let mut guard = WriteGuard { key: key.to_string(), id, acquired: false, sender: Some(sender), pending };
        let cleanup = self.cleanup.clone();

        async move {
            cleanup.wait().await;
            if let Some(previous) = previous {
                tracing::debug!(key = %guard.key, "waiting for pending cache access");
                previous.await;
            }
            guard.acquired = true;
            guard
        }
    }

    /// Wait until every write queued so far, for any key, has finished.
    pub fn settle(&self) -> impl Future<Output = ()> + Send + use<> {
        let pending: Vec<Released> = lock_table(&self.pending).values().map(|p| p.released.clone()).collect();
        let cleanup = self.cleanup.clone();
        async move {
            cleanup.wait().await;
            join_all(pending).await;
        }
    }

    #[cfg(test)]
    fn pending_keys(&self) -> usize {
        lock_table(&self.pending).len()
    }
}

/// Exclusive write access to one request key, released on drop.
pub struct WriteGuard {
    key: String,
    id: u64,
    acquired: bool,
    sender: Option<oneshot::Sender<()>>,
    pending: Table,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(());
        }
        // An abandoned waiter leaves its entry so later callers still queue behind its predecessors.
        if self.acquired {
            let mut pending = lock_table(&self.pending);
            if pending.get(&self.key).is_some_and(|p| p.id == self.id) {
                pending.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CleanupReport;

    #[tokio::test]
    async fn test_acquire_uncontended() {
        let locks = RequestLocks::new(CleanupSignal::ready());
        let guard = locks.acquire("a").await;
        assert_eq!(locks.pending_keys(), 1);

        drop(guard);
        assert_eq!(locks.pending_keys(), 0);
    }

    #[tokio::test]
    async fn test_writers_are_serialized() {
        let locks = RequestLocks::new(CleanupSignal::ready());
        let first = locks.acquire("a").await;

        let second = locks.acquire("a");
        tokio::pin!(second);
        assert!((&mut second).now_or_never().is_none());

        drop(first);
        second.await;
    }

    #[tokio::test]
    async fn test_registration_is_synchronous() {
        let locks = RequestLocks::new(CleanupSignal::ready());
        // Neither future has been polled; the second must still queue behind the first.
        let first = locks.acquire("a");
        let second = locks.acquire("a");
        tokio::pin!(second);

        let first = first.await;
        assert!((&mut second).now_or_never().is_none());
        drop(first);
        second.await;
    }

    #[tokio::test]
    async fn test_other_keys_are_independent() {
        let locks = RequestLocks::new(CleanupSignal::ready());
        let _a = locks.acquire("a").await;
        let b = locks.acquire("b").now_or_never();
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn test_everything_waits_for_cleanup() {
        let (finish, finished) = oneshot::channel::<()>();
        let signal = CleanupSignal::new(async move {
            let _ = finished.await;
            CleanupReport::default()
        });
        let locks = RequestLocks::new(signal);

        let a = locks.acquire("a");
        let b = locks.acquire("b");
        let settled = locks.settle();
        tokio::pin!(a);
        tokio::pin!(b);
        tokio::pin!(settled);
        assert!((&mut a).now_or_never().is_none());
        assert!((&mut b).now_or_never().is_none());
        assert!((&mut settled).now_or_never().is_none());

        finish.send(()).unwrap();
        a.await;
        b.await;
        settled.await;
    }

    #[tokio::test]
    async fn test_abandoned_waiter_keeps_queue_order() {
        let locks = RequestLocks::new(CleanupSignal::ready());
        let first = locks.acquire("a").await;

        // Queued, then given up before it was granted the key.
        drop(locks.acquire("a"));

        let third = locks.acquire("a");
        tokio::pin!(third);
        assert!((&mut third).now_or_never().is_none());

        drop(first);
        third.await;
    }

    #[tokio::test]
    async fn test_key_from_temporary_string() {
        let locks = RequestLocks::new(CleanupSignal::ready());
        // The returned futures must not borrow the key or the table handle.
        let guard = {
            let key = String::from("a");
            let scoped = locks.clone();
            scoped.acquire(&key)
        };
        let settled = locks.settle();
        let guard = tokio::spawn(guard).await.unwrap();
        drop(guard);
        tokio::spawn(settled).await.unwrap();
        assert_eq!(locks.pending_keys(), 0);
    }

    #[tokio::test]
    async fn test_settle_waits_for_all_keys() {
        let locks = RequestLocks::new(CleanupSignal::ready());
        let a = locks.acquire("a").await;
        let b = locks.acquire("b").await;

        let settled = locks.settle();
        tokio::pin!(settled);
        drop(a);
        assert!((&mut settled).now_or_never().is_none());
        drop(b);
        settled.await;
    }
}
