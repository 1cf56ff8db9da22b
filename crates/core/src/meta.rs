//! Meta records: when a cache entry was stored.
//!
//! A meta record lives in its own store under the same request key as the
//! response it describes, serialized as `{"date": <epoch millis>}`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Response;

#[derive(Debug, Serialize, Deserialize)]
struct SerializedMeta {
    date: i64,
}

/// Storage timestamp of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRecord {
    pub date: DateTime<Utc>,
}

impl MetaRecord {
    /// A record stamped with the current time.
    pub fn now() -> Self {
        Self { date: Utc::now() }
    }

    /// Serialize into a response body suitable for the meta store.
    pub fn to_response(&self) -> Response {
        let body = serde_json::json!({ "date": self.date.timestamp_millis() }).to_string();
        Response::new(body).with_header("Content-Type", "application/json")
    }

    /// Parse a stored meta response.
    ///
    /// Missing responses, malformed JSON and unrepresentable timestamps all
    /// yield `None`; an entry without a usable record is never an error.
    pub fn parse(response: Option<&Response>) -> Option<Self> {
        let serialized: SerializedMeta = serde_json::from_slice(&response?.body).ok()?;
        let date = DateTime::from_timestamp_millis(serialized.date)?;
        Some(Self { date })
    }

    /// Time elapsed since the record was stamped. Negative ages clamp to zero.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.date).to_std().unwrap_or_default()
    }
}

/// Whether an entry with `meta` may still be served.
///
/// Without an age limit, or without a record to judge by, entries count as
/// fresh.
pub fn is_fresh(meta: Option<&MetaRecord>, max_cache_age: Option<Duration>) -> bool {
    match (meta, max_cache_age) {
        (Some(meta), Some(max_age)) => meta.age() < max_age,
        _ => true,
    }
}
