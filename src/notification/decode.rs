use super::Notification;
use std::fmt;

/// Errors produced while decoding a notification payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    EmptyBody,
    NotAnObject,
    Malformed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyBody => write!(f, "message body is empty"),
            DecodeError::NotAnObject => write!(f, "notification must be a JSON object"),
            DecodeError::Malformed(e) => write!(f, "malformed notification: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes a JSON notification body.
///
/// Rules:
/// - Body must not be empty or whitespace only
/// - Body must be a JSON object (not array, string, etc.)
/// - `title` and `content` are required strings
pub fn decode(body: &[u8]) -> Result<Notification, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::EmptyBody);
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))
}
