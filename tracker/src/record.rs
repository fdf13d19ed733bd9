//! Typed push records.
//!
//! Everything handed to [`Tracker::push`](crate::Tracker::push) is parsed
//! into a [`Record`]: a [`ConfigPatch`] holding the directive keys found at
//! the top level of an object, and the [`Payload`] left over once those keys
//! are stripped. Strings are always payload only.
//!
//! # Directive Keys
//!
//! | Key | Effect |
//! |-----|--------|
//! | `devMode` | Log records instead of sending them |
//! | `attachClientContext` | Attach the client context to records |
//! | `sessionId` | Explicit session override |
//! | `endpoint` | Collector URL; establishes a session if none exists |
//! | `sendCaughtExceptions` | Report uncaught errors through the tracker |
//!
//! Boolean directives accept any JSON value and coerce it by truthiness
//! (`null`, `false`, `0` and `""` are false). `sessionId` and `endpoint`
//! only take effect when they are non-empty strings, but are stripped from
//! the payload either way.

use serde_json::{Map, Value};

/// Directive key toggling dev mode.
pub const DEV_MODE_KEY: &str = "devMode";

/// Directive key toggling client context attachment.
pub const ATTACH_CLIENT_CONTEXT_KEY: &str = "attachClientContext";

/// Directive key overriding the session identifier.
pub const SESSION_ID_KEY: &str = "sessionId";

/// Directive key setting the collector endpoint.
pub const ENDPOINT_KEY: &str = "endpoint";

/// Directive key enabling uncaught error reporting.
pub const SEND_CAUGHT_EXCEPTIONS_KEY: &str = "sendCaughtExceptions";

/// Key under which string pushes are wrapped.
pub const TEXT_KEY: &str = "text";

/// A delivered record: the payload plus `sessionId` and optional `context`.
pub type EventRecord = Map<String, Value>;

/// Configuration changes requested by a push.
///
/// `None` means the directive was absent (or, for the string directives,
/// present but unusable) and leaves the configuration untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub dev_mode: Option<bool>,
    pub attach_client_context: Option<bool>,
    pub session_id: Option<String>,
    pub endpoint: Option<String>,
    pub send_caught_exceptions: Option<bool>,
}

impl ConfigPatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Renders the patch back into directive keys.
    #[must_use]
    pub fn to_directives(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(v) = self.dev_mode {
            map.insert(DEV_MODE_KEY.to_string(), Value::Bool(v));
        }
        if let Some(v) = self.attach_client_context {
            map.insert(ATTACH_CLIENT_CONTEXT_KEY.to_string(), Value::Bool(v));
        }
        if let Some(v) = &self.session_id {
            map.insert(SESSION_ID_KEY.to_string(), Value::String(v.clone()));
        }
        if let Some(v) = &self.endpoint {
            map.insert(ENDPOINT_KEY.to_string(), Value::String(v.clone()));
        }
        if let Some(v) = self.send_caught_exceptions {
            map.insert(SEND_CAUGHT_EXCEPTIONS_KEY.to_string(), Value::Bool(v));
        }
        map
    }

    /// Strips every directive key from `map` and collects the patch.
    fn extract(map: &mut Map<String, Value>) -> Self {
        Self {
            dev_mode: map.remove(DEV_MODE_KEY).map(|v| truthy(&v)),
            attach_client_context: map.remove(ATTACH_CLIENT_CONTEXT_KEY).map(|v| truthy(&v)),
            session_id: map.remove(SESSION_ID_KEY).and_then(non_empty_string),
            endpoint: map.remove(ENDPOINT_KEY).and_then(non_empty_string),
            send_caught_exceptions: map.remove(SEND_CAUGHT_EXCEPTIONS_KEY).map(|v| truthy(&v)),
        }
    }
}

/// Data left for delivery once directives are applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A plain string push, delivered as `{"text": ...}`.
    Text(String),
    /// The non-directive keys of an object push.
    Structured(Map<String, Value>),
}

impl Payload {
    /// Returns true if the payload would deliver no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Structured(map) => map.is_empty(),
        }
    }

    /// Converts the payload into the JSON object that is delivered.
    #[must_use]
    pub fn into_map(self) -> EventRecord {
        match self {
            Self::Text(text) => {
                let mut map = Map::new();
                map.insert(TEXT_KEY.to_string(), Value::String(text));
                map
            }
            Self::Structured(map) => map,
        }
    }
}

/// A parsed push: directives plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub patch: ConfigPatch,
    pub payload: Payload,
}

impl Record {
    /// Parses a pushed value.
    ///
    /// Returns `None` for anything other than an object or a string.
    #[must_use]
    pub fn parse(value: Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self {
                patch: ConfigPatch::default(),
                payload: Payload::Text(text),
            }),
            Value::Object(mut map) => {
                let patch = ConfigPatch::extract(&mut map);
                Some(Self {
                    patch,
                    payload: Payload::Structured(map),
                })
            }
            _ => None,
        }
    }
}

/// JavaScript-style truthiness.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn non_empty_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_is_wrapped_as_text() {
        let record = Record::parse(json!("hello")).unwrap();

        assert!(record.patch.is_empty());
        assert_eq!(record.payload, Payload::Text("hello".to_string()));
        assert_eq!(
            Value::Object(record.payload.into_map()),
            json!({"text": "hello"})
        );
    }

    #[test]
    fn string_that_looks_like_directive_is_still_text() {
        let record = Record::parse(json!("endpoint")).unwrap();
        assert!(record.patch.is_empty());
    }

    #[test]
    fn non_object_non_string_is_rejected() {
        assert!(Record::parse(json!(42)).is_none());
        assert!(Record::parse(json!(true)).is_none());
        assert!(Record::parse(json!(null)).is_none());
        assert!(Record::parse(json!(["a", "b"])).is_none());
    }

    #[test]
    fn directives_are_extracted_and_stripped() {
        let record = Record::parse(json!({
            "devMode": true,
            "attachClientContext": false,
            "sessionId": "abc",
            "endpoint": "https://collector.example.com",
            "sendCaughtExceptions": true,
            "event": "click"
        }))
        .unwrap();

        assert_eq!(
            record.patch,
            ConfigPatch {
                dev_mode: Some(true),
                attach_client_context: Some(false),
                session_id: Some("abc".to_string()),
                endpoint: Some("https://collector.example.com".to_string()),
                send_caught_exceptions: Some(true),
            }
        );
        assert_eq!(
            Value::Object(record.payload.into_map()),
            json!({"event": "click"})
        );
    }

    #[test]
    fn directive_only_push_leaves_empty_payload() {
        let record = Record::parse(json!({"endpoint": "https://x"})).unwrap();
        assert!(record.payload.is_empty());
    }

    #[test]
    fn booleans_are_coerced_by_truthiness() {
        let record = Record::parse(json!({
            "devMode": 1,
            "attachClientContext": "",
            "sendCaughtExceptions": null
        }))
        .unwrap();

        assert_eq!(record.patch.dev_mode, Some(true));
        assert_eq!(record.patch.attach_client_context, Some(false));
        assert_eq!(record.patch.send_caught_exceptions, Some(false));
    }

    #[test]
    fn truthiness_table() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!(0.0)));
        assert!(truthy(&json!(-1)));
        assert!(truthy(&json!("false")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!({})));
    }

    #[test]
    fn empty_or_non_string_session_and_endpoint_are_stripped_but_ignored() {
        let record = Record::parse(json!({
            "sessionId": "",
            "endpoint": 42,
            "event": "x"
        }))
        .unwrap();

        assert!(record.patch.is_empty());
        assert_eq!(Value::Object(record.payload.into_map()), json!({"event": "x"}));
    }

    #[test]
    fn nested_directive_names_are_payload() {
        let record = Record::parse(json!({"event": {"endpoint": "nested"}})).unwrap();
        assert!(record.patch.is_empty());
        assert!(!record.payload.is_empty());
    }

    #[test]
    fn patch_renders_back_to_directives() {
        let patch = ConfigPatch {
            endpoint: Some("https://x".to_string()),
            dev_mode: Some(false),
            ..ConfigPatch::default()
        };

        let reparsed = Record::parse(Value::Object(patch.to_directives())).unwrap();
        assert_eq!(reparsed.patch, patch);
        assert!(reparsed.payload.is_empty());
    }
}
