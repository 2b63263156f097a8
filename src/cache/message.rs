//! Structured messages a host may post to the engine.

use serde::Deserialize;
use serde_json::Value;

/// The messages the engine understands. Anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    /// Sweep expired entries out of the current store.
    #[serde(rename = "CLEANUP_CACHE")]
    CleanupCache,
}

impl HostMessage {
    /// Interprets a raw message; `None` for any unrecognized shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cleanup_is_recognized() {
        assert_eq!(
            HostMessage::from_value(&json!({ "type": "CLEANUP_CACHE" })),
            Some(HostMessage::CleanupCache)
        );
        assert_eq!(
            HostMessage::from_value(&json!({ "type": "CLEANUP_CACHE", "at": 1 })),
            Some(HostMessage::CleanupCache)
        );
    }

    #[test]
    fn other_shapes_are_ignored() {
        for value in [
            json!(null),
            json!("CLEANUP_CACHE"),
            json!({}),
            json!({ "type": "cleanup_cache" }),
            json!({ "type": "SKIP_WAITING" }),
            json!({ "kind": "CLEANUP_CACHE" }),
            json!([{ "type": "CLEANUP_CACHE" }]),
        ] {
            assert_eq!(HostMessage::from_value(&value), None, "{value}");
        }
    }
}
