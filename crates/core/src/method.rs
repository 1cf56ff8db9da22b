//! Cache strategies selectable per call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// How a cached query combines the cache and the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMethod {
    /// Run the query directly; the cache is neither read nor written.
    #[default]
    NoCache,
    /// Always fetch, then store the response.
    NoCacheReload,
    /// Serve a fresh cached response if there is one, otherwise fetch and store.
    CacheFirst,
    /// Deliver the cached value (if any) right away, then the freshly fetched one.
    Swr,
}

impl CacheMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMethod::NoCache => "no-cache",
            CacheMethod::NoCacheReload => "no-cache-reload",
            CacheMethod::CacheFirst => "cache-first",
            CacheMethod::Swr => "swr",
        }
    }
}

impl fmt::Display for CacheMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-cache" => Ok(CacheMethod::NoCache),
            "no-cache-reload" => Ok(CacheMethod::NoCacheReload),
            "cache-first" => Ok(CacheMethod::CacheFirst),
            "swr" => Ok(CacheMethod::Swr),
            other => Err(Error::InvalidInput(format!("unknown cache method: {other}"))),
        }
    }
}
