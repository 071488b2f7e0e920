//! Raw event payloads as returned by a provider.
//!
//! A [`RawProviderEvent`] is the untouched JSON object from the provider's
//! event listing. The normalizer only reads the fields listed in each
//! provider's mapping table; everything else is carried through as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One provider-shaped event, opaque apart from the fields the normalizer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProviderEvent(Value);

impl RawProviderEvent {
    /// Wraps a JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Looks up a dotted path such as `start.dateTime`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.0, |value, segment| value.get(segment))
    }
}

impl From<Value> for RawProviderEvent {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_lookup() {
        let raw = RawProviderEvent::new(json!({
            "start": {"dateTime": "2025-03-15T10:00:00Z"},
            "location": {"displayName": "HQ"}
        }));
        assert_eq!(
            raw.get("start.dateTime").and_then(Value::as_str),
            Some("2025-03-15T10:00:00Z")
        );
        assert_eq!(raw.get("location.displayName").and_then(Value::as_str), Some("HQ"));
        assert!(raw.get("end.dateTime").is_none());
        assert!(raw.get("start.dateTime.nested").is_none());
    }

    #[test]
    fn serializes_transparently() {
        let raw = RawProviderEvent::new(json!({"id": "a"}));
        assert_eq!(serde_json::to_string(&raw).unwrap(), r#"{"id":"a"}"#);
    }
}
