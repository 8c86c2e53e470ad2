use serde_json::Value;
use thiserror::Error;

/// A backend rejection normalized to a status code and a human-readable
/// message pulled out of whatever error shape the server emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiRejection {
    pub status: u16,
    pub message: String,
}

impl ApiRejection {
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = message_from_body(body)
            .unwrap_or_else(|| format!("request failed with status {status}"));
        Self { status, message }
    }
}

/// Extracts a displayable message from the error bodies the backend produces:
/// `{"detail": ...}`, `{"error": ...}`, `{"message": ...}`,
/// `{"non_field_errors": [...]}` and per-field validation maps.
pub fn message_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    message_from_value(&value)
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Array(items) => items.iter().find_map(message_from_value),
        Value::Object(map) => {
            for key in ["detail", "error", "message", "non_field_errors"] {
                if let Some(found) = map.get(key).and_then(message_from_value) {
                    return Some(found);
                }
            }
            map.iter().find_map(|(field, messages)| {
                message_from_value(messages).map(|message| format!("{field}: {message}"))
            })
        }
        _ => None,
    }
}
