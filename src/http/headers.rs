//! HTTP header map with case-insensitive name lookup.
//!
//! HTTP headers are order-preserving and case-insensitive per [RFC 9110 §5].
//! The map is serializable so cached entries can be written to disk verbatim.

use serde::{Deserialize, Serialize};

/// Hop-by-hop headers that describe a single connection and never travel
/// through a proxy or into the cache's wire output.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// A case-insensitive, multi-value HTTP header map.
///
/// # Examples
///
/// ```
/// use imgcache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "image/png");
/// headers.set("sw-cache-expires", "1000");
/// headers.set("SW-Cache-Expires", "2000");
///
/// assert_eq!(headers.get("content-type"), Some("image/png"));
/// assert_eq!(headers.get("sw-cache-expires"), Some("2000"));
/// assert_eq!(headers.get_all("sw-cache-expires").count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every value of `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all values for the given header name (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns an iterator over the end-to-end headers, skipping hop-by-hop ones.
    pub fn end_to_end(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(name, _)| !is_hop_by_hop(name))
    }
}

/// Returns `true` if `name` is a connection-scoped header.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Content-Type", "image/webp");
        assert_eq!(h.get("content-type"), Some("image/webp"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("image/webp"));
    }

    #[test]
    fn set_overwrites_every_case_variant() {
        let mut h = Headers::new();
        h.insert("X-Foo", "a");
        h.insert("x-foo", "b");
        h.set("X-FOO", "c");
        let vals: Vec<_> = h.get_all("x-foo").collect();
        assert_eq!(vals, vec!["c"]);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut h = Headers::new();
        h.insert("ETag", "\"abc\"");
        assert!(h.remove("etag"));
        assert!(h.is_empty());
        assert!(!h.remove("etag"));
    }

    #[test]
    fn end_to_end_skips_connection_headers() {
        let mut h = Headers::new();
        h.insert("Connection", "keep-alive");
        h.insert("Transfer-Encoding", "chunked");
        h.insert("Cache-Control", "max-age=60");
        let names: Vec<_> = h.end_to_end().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Cache-Control"]);
    }

    #[test]
    fn serializes_as_pair_list() {
        let mut h = Headers::new();
        h.insert("Content-Type", "image/gif");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"[["Content-Type","image/gif"]]"#);
        let back: Headers = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
