//! SQLite-backed caches.
//!
//! [`CacheDb`] acts as the cache registry; every named cache is a row in
//! `caches`, and its entries live in `cache_entries` keyed by
//! `(cache_name, request_key)`. Deleting a cache cascades to its entries.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};
use url::Url;

use super::connection::CacheDb;
use super::{Storage, Store};
use crate::{Error, Request, Response};

/// Raw stored request columns: method, url, headers json, body.
type RequestRow = (String, String, String, Option<Vec<u8>>);

/// One named cache inside a [`CacheDb`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Handle to the cache called `name`, creating its registry row if needed.
    pub async fn store(&self, name: &str) -> Result<SqliteStore, Error> {
        let cache_name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![cache_name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(SqliteStore { db: self.clone(), name: name.to_string() })
    }
}

#[async_trait]
impl Storage for CacheDb {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, Error> {
        Ok(Arc::new(self.store(name).await?))
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, request: &Request) -> Result<Option<Response>, Error> {
        let name = self.name.clone();
        let key = request.key();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(i64, String, Vec<u8>)>, Error> {
                let row = conn
                    .query_row(
                        "SELECT status, response_headers_json, response_body
                        FROM cache_entries WHERE cache_name = ?1 AND request_key = ?2",
                        params![name, key],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        let Some((status, headers_json, body)) = row else {
            return Ok(None);
        };

        let status = u16::try_from(status).map_err(|e| Error::StoreUnavailable(format!("stored status: {e}")))?;
        let headers = serde_json::from_str(&headers_json)
            .map_err(|e| Error::StoreUnavailable(format!("stored headers: {e}")))?;

        Ok(Some(Response { status, headers, body: Bytes::from(body) }))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), Error> {
        let name = self.name.clone();
        let key = request.key();
        let method = request.method.clone();
        let url = request.url.to_string();
        let request_headers = serde_json::to_string(&request.headers)?;
        let request_body = request.body.as_ref().map(|b| b.to_vec());
        let response_headers = serde_json::to_string(&response.headers)?;
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (
                    cache_name, request_key, method, url, request_headers_json, request_body,
                    status, response_headers_json, response_body, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(cache_name, request_key) DO UPDATE SET
                    method = excluded.method,
                    url = excluded.url,
                    request_headers_json = excluded.request_headers_json,
                    request_body = excluded.request_body,
                    status = excluded.status,
                    response_headers_json = excluded.response_headers_json,
                    response_body = excluded.response_body,
                    stored_at = excluded.stored_at",
                    params![
                        name,
                        key,
                        method,
                        url,
                        request_headers,
                        request_body,
                        response.status as i64,
                        response_headers,
                        response.body.to_vec(),
                        stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let name = self.name.clone();
        let key = request.key();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND request_key = ?2",
                    params![name, key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<Request>, Error> {
        let name = self.name.clone();
        let rows = self
            .db
            .conn
            .call(move |conn| -> Result<Vec<RequestRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, request_headers_json, request_body
                    FROM cache_entries WHERE cache_name = ?1 ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
                    .collect::<Result<Vec<RequestRow>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(method, url, headers_json, body)| {
                let url = Url::parse(&url).map_err(|e| Error::StoreUnavailable(format!("stored url: {e}")))?;
                let headers = serde_json::from_str(&headers_json)
                    .map_err(|e| Error::StoreUnavailable(format!("stored headers: {e}")))?;
                Ok(Request { method, url, headers, body: body.map(Bytes::from) })
            })
            .collect()
    }
}
