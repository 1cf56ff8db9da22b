//! Request key generation.

use sha2::{Digest, Sha256};

/// Compute the key that addresses a request's entries in every store.
///
/// Identical method, URL and body always produce the same key. Headers do not
/// participate.
pub fn compute_request_key(method: &str, url: &str, body: Option<&[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    if let Some(body) = body {
        hasher.update(body);
    }
    hex::encode(hasher.finalize())
}
