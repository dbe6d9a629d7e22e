use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachment::FileContent;
use crate::constants::MessageType;

/// Account role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    Member,
}

impl Role {
    /// Login tag for this role.
    pub fn login_tag(self) -> MessageType {
        match self {
            Role::Admin => MessageType::LoginAdmin,
            Role::Member => MessageType::LoginMember,
        }
    }
}

/// Online presence of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    #[default]
    #[serde(other)]
    Offline,
}

/// A chat participant. `email` is the stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(rename = "username", alias = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "userType", alias = "role", default)]
    pub role: Role,
    #[serde(rename = "status", alias = "presence", default)]
    pub presence: Presence,
}

impl User {
    pub fn new(email: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
            role,
            presence: Presence::Online,
        }
    }
}

/// Body of a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    File(FileContent),
}

impl MessageBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(t) => Some(t),
            MessageBody::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileContent> {
        match self {
            MessageBody::File(f) => Some(f),
            MessageBody::Text(_) => None,
        }
    }
}

/// One entry of the conversation log.
///
/// Created once from local composition or inbound decode and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub kind: MessageType,
    pub sender: Option<String>,
    pub sender_name: Option<String>,
    pub receiver: Option<String>,
    pub body: MessageBody,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Returns `true` if this entry belongs to the conversation between
    /// `a` and `b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        match (self.sender.as_deref(), self.receiver.as_deref()) {
            (Some(s), Some(r)) => (s == a && r == b) || (s == b && r == a),
            _ => false,
        }
    }
}

/// A file previously shared and stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: Option<i64>,
    pub file: FileContent,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl StoredFile {
    /// Log entry representing this stored file.
    pub fn to_log_entry(&self) -> ChatMessage {
        ChatMessage {
            kind: MessageType::File,
            sender: self.sender.clone(),
            sender_name: None,
            receiver: self.receiver.clone(),
            body: MessageBody::File(self.file.clone()),
            timestamp: self.timestamp,
        }
    }
}

/// Start/stop typing signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub sender: String,
    pub receiver: Option<String>,
    pub is_typing: bool,
}

/// Credentials passed through to the backend's auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub role: Role,
    pub email: String,
    pub password: String,
}

/// Member registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

/// Join/leave notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceNotice {
    pub email: Option<String>,
    pub username: Option<String>,
    pub text: Option<String>,
}

/// Lenient epoch-millis / RFC 3339 timestamp (de)serialization.
///
/// The backend emits epoch milliseconds while browser clients emit ISO
/// strings; both are accepted. Unparseable values decode as `None` rather
/// than failing the whole envelope. Timestamps are always written as millis.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(t) => serializer.serialize_i64(t.timestamp_millis()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(from_value))
    }

    /// Converts a JSON value into a timestamp, if it looks like one.
    pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .and_then(DateTime::from_timestamp_millis),
            Value::String(s) => parse_str(s),
            _ => None,
        }
    }

    fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(ms) = s.parse::<i64>() {
            return DateTime::from_timestamp_millis(ms);
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Some(t.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|n| n.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_decodes_backend_shape() {
        let u: User = serde_json::from_value(json!({
            "id": 7,
            "email": "ann@example.com",
            "username": "Ann",
            "userType": "admin",
            "status": "online"
        }))
        .unwrap();
        assert_eq!(u.email, "ann@example.com");
        assert_eq!(u.display_name, "Ann");
        assert_eq!(u.role, Role::Admin);
        assert_eq!(u.presence, Presence::Online);
    }

    #[test]
    fn user_defaults_missing_and_unknown_fields() {
        let u: User = serde_json::from_value(json!({
            "email": "bob@example.com",
            "userType": "superuser",
            "status": "away"
        }))
        .unwrap();
        assert_eq!(u.display_name, "");
        assert_eq!(u.role, Role::Member);
        assert_eq!(u.presence, Presence::Offline);
    }

    #[test]
    fn user_requires_email() {
        let r: Result<User, _> = serde_json::from_value(json!({"username": "nobody"}));
        assert!(r.is_err());
    }

    #[test]
    fn login_tag_per_role() {
        assert_eq!(Role::Admin.login_tag(), MessageType::LoginAdmin);
        assert_eq!(Role::Member.login_tag(), MessageType::LoginMember);
    }

    #[test]
    fn conversation_membership_is_unordered() {
        let msg = ChatMessage {
            kind: MessageType::PrivateMessage,
            sender: Some("a".into()),
            sender_name: None,
            receiver: Some("b".into()),
            body: MessageBody::Text("hi".into()),
            timestamp: None,
        };
        assert!(msg.is_between("a", "b"));
        assert!(msg.is_between("b", "a"));
        assert!(!msg.is_between("a", "c"));

        let broadcast = ChatMessage {
            receiver: None,
            ..msg
        };
        assert!(!broadcast.is_between("a", "b"));
    }

    #[test]
    fn timestamps_accept_millis_and_iso() {
        let ms = timestamp::from_value(&json!(1_700_000_000_000i64)).unwrap();
        assert_eq!(ms.timestamp_millis(), 1_700_000_000_000);

        let iso = timestamp::from_value(&json!("2023-11-14T22:13:20Z")).unwrap();
        assert_eq!(iso, ms);

        let sql = timestamp::from_value(&json!("2023-11-14 22:13:20.0")).unwrap();
        assert_eq!(sql, ms);

        assert!(timestamp::from_value(&json!("yesterday-ish")).is_none());
        assert!(timestamp::from_value(&json!(true)).is_none());
    }
}
