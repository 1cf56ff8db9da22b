//! Durable key-value caches for request/response pairs.
//!
//! A [`Storage`] is a registry of named caches; each name opens a [`Store`]
//! holding responses keyed by the request that produced them. Two backends
//! are provided:
//!
//! - [`MemoryStorage`] keeps everything in process memory
//! - [`CacheDb`] persists caches in SQLite through tokio-rusqlite, with WAL
//!   mode and versioned schema migrations

use std::sync::Arc;

use async_trait::async_trait;

pub mod connection;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use crate::Error;
use crate::{Request, Response};

pub use connection::CacheDb;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStore;

/// Registry of named caches.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open the cache called `name`, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, Error>;

    /// Delete the cache called `name` and all of its entries.
    ///
    /// Returns whether a cache was deleted.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Names of all existing caches, oldest first.
    async fn keys(&self) -> Result<Vec<String>, Error>;
}

/// One named cache of request/response pairs.
#[async_trait]
pub trait Store: Send + Sync {
    /// The name this cache was opened under.
    fn name(&self) -> &str;

    /// The response stored for `request`, if any.
    async fn lookup(&self, request: &Request) -> Result<Option<Response>, Error>;

    /// Store `response` for `request`, replacing any previous entry.
    async fn put(&self, request: &Request, response: Response) -> Result<(), Error>;

    /// Remove the entry for `request`. Returns whether one existed.
    async fn delete(&self, request: &Request) -> Result<bool, Error>;

    /// Requests of all stored entries, oldest first.
    async fn keys(&self) -> Result<Vec<Request>, Error>;
}
