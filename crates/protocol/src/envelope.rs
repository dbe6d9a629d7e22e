use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::MessageType;
use crate::error::ProtocolError;
use crate::types::timestamp;

/// Envelope for all chat traffic.
///
/// Only `type` is mandatory. Tag-specific fields that are not part of the
/// common header (`users`, `messages`, `files`, `isTyping`, ...) are kept in
/// `extra` so unknown envelopes survive a decode/encode cycle untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, alias = "senderEmail", skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, alias = "receiverEmail", skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Creates an empty envelope with the given tag.
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            sender: None,
            receiver: None,
            content: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<Value>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Adds a tag-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Parses one JSON text into an envelope.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes to a single-line JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Tag-specific field, `null` treated as absent.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|v| !v.is_null())
    }

    /// Tag-specific string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// `content`, with a JSON document embedded as a string parsed back into
    /// structure.
    ///
    /// Some senders encode lists and objects as a string inside `content`;
    /// this undoes that so callers see one representation.
    pub fn structured_content(&self) -> Option<Value> {
        self.content
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| normalize_nested(v.clone()))
    }
}

/// Parses a string that holds a JSON object or array. Other values are
/// returned unchanged.
pub(crate) fn normalize_nested(value: Value) -> Value {
    if let Value::String(s) = &value {
        let trimmed = s.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                return parsed;
            }
        }
    }
    value
}
