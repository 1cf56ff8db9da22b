//! Core types and storage for reqcache.
//!
//! This crate provides:
//! - Request/response values and the request keys that address them
//! - Cache storage traits with in-memory and SQLite backends
//! - Meta records used to judge entry freshness
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod meta;
pub mod method;
pub mod request;

pub use cache::{CacheDb, MemoryStorage, Storage, Store};
pub use config::AppConfig;
pub use error::Error;
pub use meta::{MetaRecord, is_fresh};
pub use method::CacheMethod;
pub use request::{Request, Response};
