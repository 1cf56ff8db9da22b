//! Unified error types for reqcache.
//!
//! Every message carries a stable code prefix so callers and logs can
//! classify failures without matching on variants.

use tokio_rusqlite::rusqlite;

/// Unified error type for the cache engine, its stores and queries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller's cancellation token was triggered.
    #[error("CANCELLED: operation was cancelled")]
    Cancelled,

    /// The fetcher failed before producing a response.
    #[error("FETCH_FAILED: {0}")]
    Fetch(String),

    /// The server answered with a status the query refused.
    #[error("HTTP_ERROR: status {0}")]
    HttpStatus(u16),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A response body could not be turned into the query's value.
    #[error("PARSE_FAILED: {0}")]
    Parse(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A store could not be opened or used.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error came from a triggered cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether this error is a parse (corruption or schema) failure.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
