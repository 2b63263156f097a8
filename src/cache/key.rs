//! Request identity: the method + URL pair every cache entry is keyed by.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::http::Request;

/// The identity of a cached request.
///
/// Two requests share an entry iff their method strings and full URLs
/// (query included) are byte-for-byte equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self::new(request.method().as_str(), request.url())
    }

    /// Stable hex-encoded SHA-256 of the identity, usable as a file name.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let key = RequestKey::new("GET", "http://example.com/a.png");
        assert_eq!(key.digest(), key.clone().digest());
        assert_eq!(key.digest().len(), 64);
        assert!(key.digest().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn method_is_part_of_the_identity() {
        let get = RequestKey::new("GET", "http://example.com/a.png");
        let head = RequestKey::new("HEAD", "http://example.com/a.png");
        assert_ne!(get, head);
        assert_ne!(get.digest(), head.digest());
    }

    #[test]
    fn query_is_part_of_the_identity() {
        let a = RequestKey::from_request(&Request::get("http://example.com/a.png?v=1"));
        let b = RequestKey::from_request(&Request::get("http://example.com/a.png?v=2"));
        assert_ne!(a.digest(), b.digest());
    }
}
