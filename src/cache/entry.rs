//! Stored response entries and their expiration stamp.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::key::RequestKey;
use crate::http::{Headers, Response, StatusCode};

/// Synthetic header carrying the entry's expiration time as decimal
/// milliseconds since the Unix epoch.
pub const EXPIRES_HEADER: &str = "sw-cache-expires";

/// Where an entry stands relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh { expires_at: u64 },
    /// The stamp is at or before now.
    Expired { expires_at: u64 },
    /// No stamp, or one that is not a decimal integer. Only a lookup treats
    /// this as expired; a sweep leaves it alone.
    Unstamped,
}

/// A response as held in a store: the original status, headers, and body,
/// plus the expiration header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    key: RequestKey,
    status: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    headers: Headers,
    #[serde(serialize_with = "encode_body", deserialize_with = "decode_body")]
    body: Bytes,
}

impl StoredEntry {
    /// Duplicates `response` and stamps the copy with `expires_at`,
    /// overwriting any expiration header the upstream may have sent.
    pub fn stamp(key: RequestKey, response: &Response, expires_at: u64) -> Self {
        let mut headers = response.headers().clone();
        headers.set(EXPIRES_HEADER, expires_at.to_string());
        Self {
            key,
            status: response.status(),
            reason: response.reason().map(str::to_owned),
            headers,
            body: response.body_ref().clone(),
        }
    }

    /// Builds an entry from raw parts, stamped or not.
    pub fn from_parts(key: RequestKey, response: &Response) -> Self {
        Self {
            key,
            status: response.status(),
            reason: response.reason().map(str::to_owned),
            headers: response.headers().clone(),
            body: response.body_ref().clone(),
        }
    }

    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The parsed expiration stamp, if present and well-formed.
    pub fn expires_at(&self) -> Option<u64> {
        self.headers.get(EXPIRES_HEADER)?.trim().parse().ok()
    }

    pub fn freshness(&self, now_millis: u64) -> Freshness {
        match self.expires_at() {
            None => Freshness::Unstamped,
            Some(expires_at) if expires_at <= now_millis => Freshness::Expired { expires_at },
            Some(expires_at) => Freshness::Fresh { expires_at },
        }
    }

    /// Rebuilds the stored response verbatim, expiration header included.
    pub fn to_response(&self) -> Response {
        Response::from_parts(
            self.status,
            self.reason.clone(),
            self.headers.clone(),
            self.body.clone(),
        )
    }
}

fn encode_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(body))
}

fn decode_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RequestKey {
        RequestKey::new("GET", "http://example.com/a.png")
    }

    fn png() -> Response {
        Response::new(StatusCode::OK)
            .header("Content-Type", "image/png")
            .body_bytes(&b"\x89PNG"[..])
    }

    #[test]
    fn stamp_adds_header_without_touching_original() {
        let original = png();
        let entry = StoredEntry::stamp(key(), &original, 5_000);
        assert_eq!(entry.expires_at(), Some(5_000));
        assert!(!original.headers().contains(EXPIRES_HEADER));
        assert_eq!(entry.to_response().body_ref(), original.body_ref());
    }

    #[test]
    fn stamp_overwrites_upstream_value() {
        let upstream = png().header("SW-Cache-Expires", "1");
        let entry = StoredEntry::stamp(key(), &upstream, 9);
        let values: Vec<_> = entry.headers().get_all(EXPIRES_HEADER).collect();
        assert_eq!(values, vec!["9"]);
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        let entry = StoredEntry::stamp(key(), &png(), 1_000);
        assert_eq!(entry.freshness(999), Freshness::Fresh { expires_at: 1_000 });
        assert_eq!(entry.freshness(1_000), Freshness::Expired { expires_at: 1_000 });
        assert_eq!(entry.freshness(1_001), Freshness::Expired { expires_at: 1_000 });
    }

    #[test]
    fn missing_or_garbled_stamp_is_unstamped() {
        let bare = StoredEntry::from_parts(key(), &png());
        assert_eq!(bare.freshness(0), Freshness::Unstamped);

        let garbled = StoredEntry::from_parts(key(), &png().header(EXPIRES_HEADER, "soon"));
        assert_eq!(garbled.freshness(0), Freshness::Unstamped);
    }

    #[test]
    fn json_encodes_body_as_base64() {
        let entry = StoredEntry::stamp(key(), &png(), 7);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["body"], "iVBORw==");
        assert_eq!(json["status"], 200);
        let back: StoredEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
