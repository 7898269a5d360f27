//! Extracts a server-supplied error message from a response body.

use serde_json::Value;

/// Returns the server's human-readable error text, or an empty string when
/// the body carries none.
pub trait ErrorBodyParser: Send + Sync {
    fn parse(&self, body: &[u8]) -> String;
}

/// Understands the common JSON error envelopes: `{"error": "..."}`,
/// `{"error": {"message": "..."}}`, `{"message": "..."}`, `{"detail": "..."}`
/// and `{"errors": ["...", {"message": "..."}]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorBodyParser;

impl ErrorBodyParser for JsonErrorBodyParser {
    fn parse(&self, body: &[u8]) -> String {
        let Ok(Value::Object(root)) = serde_json::from_slice::<Value>(body) else {
            return String::new();
        };

        if let Some(message) = root.get("error").and_then(message_of) {
            return message;
        }
        for key in ["message", "detail"] {
            if let Some(Value::String(s)) = root.get(key) {
                if !s.is_empty() {
                    return s.clone();
                }
            }
        }
        if let Some(Value::Array(errors)) = root.get("errors") {
            return errors
                .iter()
                .filter_map(message_of)
                .collect::<Vec<_>>()
                .join(", ");
        }
        String::new()
    }
}

fn message_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}
