//! In-process cache storage.
//!
//! Mirrors the browser cache-storage contract closely enough for tests and
//! short-lived tools: opening an existing name returns the same entries, and
//! deleting a cache detaches it so old handles only see an empty store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Storage, Store};
use crate::{Error, Request, Response};

struct Entry {
    key: String,
    request: Request,
    response: Response,
}

/// A single in-memory cache.
pub struct MemoryStore {
    name: String,
    entries: Mutex<Vec<Entry>>,
}

impl MemoryStore {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), entries: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, request: &Request) -> Result<Option<Response>, Error> {
        let key = request.key();
        let entries = self.entries.lock().await;
        Ok(entries.iter().find(|e| e.key == key).map(|e| e.response.clone()))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), Error> {
        let key = request.key();
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.request = request.clone();
                entry.response = response;
            }
            None => entries.push(Entry { key, request: request.clone(), response }),
        }
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let key = request.key();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.key != key);
        Ok(entries.len() != before)
    }

    async fn keys(&self) -> Result<Vec<Request>, Error> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().map(|e| e.request.clone()).collect())
    }
}

/// Registry of in-memory caches.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    caches: Arc<Mutex<Vec<Arc<MemoryStore>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, Error> {
        let mut caches = self.caches.lock().await;
        if let Some(existing) = caches.iter().find(|c| c.name == name) {
            return Ok(existing.clone());
        }
        let store = Arc::new(MemoryStore::new(name));
        caches.push(store.clone());
        Ok(store)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let removed = {
            let mut caches = self.caches.lock().await;
            caches
                .iter()
                .position(|c| c.name == name)
                .map(|index| caches.remove(index))
        };
        match removed {
            Some(store) => {
                store.entries.lock().await.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let caches = self.caches.lock().await;
        Ok(caches.iter().map(|c| c.name.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str) -> Request {
        Request::parse("POST", "http://test.url").unwrap().with_body(body.to_string())
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let storage = MemoryStorage::new();
        let store = storage.open("requestCache-v1").await.unwrap();
        store.put(&request("a"), Response::new("one")).await.unwrap();

        let found = store.lookup(&request("a")).await.unwrap().unwrap();
        assert_eq!(found.body, "one");
        assert!(store.lookup(&request("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let storage = MemoryStorage::new();
        let store = storage.open("requestCache-v1").await.unwrap();
        store.put(&request("a"), Response::new("one")).await.unwrap();
        store.put(&request("a"), Response::new("two")).await.unwrap();

        assert_eq!(store.keys().await.unwrap().len(), 1);
        assert_eq!(store.lookup(&request("a")).await.unwrap().unwrap().body, "two");
    }

    #[tokio::test]
    async fn test_open_returns_same_entries() {
        let storage = MemoryStorage::new();
        let first = storage.open("metaCache-v1").await.unwrap();
        first.put(&request("a"), Response::new("x")).await.unwrap();

        let second = storage.open("metaCache-v1").await.unwrap();
        assert!(second.lookup(&request("a")).await.unwrap().is_some());
        assert_eq!(storage.keys().await.unwrap(), vec!["metaCache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_detaches_store() {
        let storage = MemoryStorage::new();
        let old = storage.open("requestCache-v1").await.unwrap();
        old.put(&request("a"), Response::new("x")).await.unwrap();

        assert!(storage.delete("requestCache-v1").await.unwrap());
        assert!(!storage.delete("requestCache-v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(old.lookup(&request("a")).await.unwrap().is_none());

        let reopened = storage.open("requestCache-v1").await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let storage = MemoryStorage::new();
        let store = storage.open("requestCache-v1").await.unwrap();
        store.put(&request("a"), Response::new("x")).await.unwrap();

        assert!(store.delete(&request("a")).await.unwrap());
        assert!(!store.delete(&request("a")).await.unwrap());
    }
}
