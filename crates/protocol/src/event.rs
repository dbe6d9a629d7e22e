//! Typed view over [`Envelope`].
//!
//! Every canonical tag has one variant whose required fields are checked at
//! decode time. Envelopes that do not match their tag's shape are rejected
//! with a [`ProtocolError`]; tags outside the canonical set decode to
//! [`Event::Unknown`] untouched.

use serde_json::{Map, Value, json};

use crate::attachment::FileContent;
use crate::constants::MessageType;
use crate::envelope::{Envelope, normalize_nested};
use crate::error::ProtocolError;
use crate::types::{
    ChatMessage, LoginRequest, MessageBody, PresenceNotice, RegisterRequest, Role, StoredFile,
    TypingSignal, User, timestamp,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `message`, `private_message` or `chat_message`.
    Chat(ChatMessage),
    File(ChatMessage),
    Login(LoginRequest),
    LoginSuccess(User),
    Register(RegisterRequest),
    RegisterSuccess {
        message: Option<String>,
    },
    Logout {
        sender: Option<String>,
    },
    UserList(Vec<User>),
    GetUsers {
        sender: Option<String>,
    },
    UserJoined(PresenceNotice),
    UserLeft(PresenceNotice),
    GetHistory {
        sender: Option<String>,
    },
    GetConversation {
        sender: Option<String>,
        peer: String,
    },
    /// `conversation_history` or `history` snapshot.
    History {
        tag: MessageType,
        messages: Vec<ChatMessage>,
    },
    Typing(TypingSignal),
    FilesList(Vec<StoredFile>),
    GetFiles {
        sender: Option<String>,
    },
    Error {
        message: String,
    },
    Unknown(Envelope),
}

impl Event {
    /// Wire tag of this event.
    pub fn msg_type(&self) -> MessageType {
        match self {
            Event::Chat(m) => m.kind.clone(),
            Event::File(_) => MessageType::File,
            Event::Login(req) => req.role.login_tag(),
            Event::LoginSuccess(_) => MessageType::LoginSuccess,
            Event::Register(_) => MessageType::RegisterMember,
            Event::RegisterSuccess { .. } => MessageType::RegisterSuccess,
            Event::Logout { .. } => MessageType::Logout,
            Event::UserList(_) => MessageType::UserList,
            Event::GetUsers { .. } => MessageType::GetUsers,
            Event::UserJoined(_) => MessageType::UserJoined,
            Event::UserLeft(_) => MessageType::UserLeft,
            Event::GetHistory { .. } => MessageType::GetHistory,
            Event::GetConversation { .. } => MessageType::GetConversation,
            Event::History { tag, .. } => tag.clone(),
            Event::Typing(_) => MessageType::Typing,
            Event::FilesList(_) => MessageType::FilesList,
            Event::GetFiles { .. } => MessageType::GetFiles,
            Event::Error { .. } => MessageType::Error,
            Event::Unknown(env) => env.msg_type.clone(),
        }
    }

    /// Parses and validates one JSON text.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Self::decode(Envelope::from_json(text)?)
    }

    /// Validates an envelope against its tag's required shape.
    pub fn decode(env: Envelope) -> Result<Self, ProtocolError> {
        let tag = env.msg_type.clone();
        let fields = Fields::new(&env);

        let event = match tag {
            MessageType::Message | MessageType::PrivateMessage | MessageType::ChatMessage => {
                Event::Chat(decode_chat(&env)?)
            }
            MessageType::File => Event::File(decode_file(&env, &fields)?),
            MessageType::LoginAdmin | MessageType::LoginMember => {
                let role = if tag == MessageType::LoginAdmin {
                    Role::Admin
                } else {
                    Role::Member
                };
                Event::Login(LoginRequest {
                    role,
                    email: fields.require(&tag, "email", env.sender.as_deref())?,
                    password: fields.require(&tag, "password", None)?,
                })
            }
            MessageType::LoginSuccess => {
                let email = fields.require(&tag, "email", env.sender.as_deref())?;
                let role = match fields.get("userType") {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => Role::default(),
                };
                let name = fields.str("username").unwrap_or_default();
                Event::LoginSuccess(User::new(email, name, role))
            }
            MessageType::RegisterMember => Event::Register(RegisterRequest {
                email: fields.require(&tag, "email", env.sender.as_deref())?,
                password: fields.require(&tag, "password", None)?,
                username: fields.require(&tag, "username", None)?,
            }),
            MessageType::RegisterSuccess => Event::RegisterSuccess {
                message: fields.str("message").or(fields.text()).map(str::to_string),
            },
            MessageType::Logout => Event::Logout {
                sender: env.sender.clone(),
            },
            MessageType::UserList => {
                let list = fields.list(&tag, "users")?;
                let users = serde_json::from_value(Value::Array(list))?;
                Event::UserList(users)
            }
            MessageType::GetUsers => Event::GetUsers {
                sender: env.sender.clone(),
            },
            MessageType::UserJoined => Event::UserJoined(presence_notice(&env, &fields)),
            MessageType::UserLeft => Event::UserLeft(presence_notice(&env, &fields)),
            MessageType::GetHistory => Event::GetHistory {
                sender: env.sender.clone(),
            },
            MessageType::GetConversation => Event::GetConversation {
                sender: env.sender.clone(),
                peer: fields.require(&tag, "otherUserEmail", env.receiver.as_deref())?,
            },
            MessageType::ConversationHistory | MessageType::History => {
                let default_kind = if tag == MessageType::History {
                    MessageType::Message
                } else {
                    MessageType::PrivateMessage
                };
                let messages = fields
                    .list(&tag, "messages")?
                    .iter()
                    .filter_map(|item| history_item(item, &default_kind))
                    .collect();
                Event::History { tag, messages }
            }
            MessageType::Typing => {
                let sender = fields.require(&tag, "sender", env.sender.as_deref())?;
                Event::Typing(TypingSignal {
                    sender,
                    receiver: env.receiver.clone(),
                    is_typing: typing_flag(&env),
                })
            }
            MessageType::FilesList => {
                let files = fields
                    .list(&tag, "files")?
                    .iter()
                    .filter_map(stored_file)
                    .collect();
                Event::FilesList(files)
            }
            MessageType::GetFiles => Event::GetFiles {
                sender: env.sender.clone(),
            },
            MessageType::Error => Event::Error {
                message: fields
                    .text()
                    .or(fields.str("message"))
                    .unwrap_or("unspecified error")
                    .to_string(),
            },
            MessageType::Unknown(_) => Event::Unknown(env),
        };
        Ok(event)
    }

    /// Builds the wire envelope for this event.
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Event::Chat(m) => chat_envelope(m),
            Event::File(m) => chat_envelope(m),
            Event::Login(req) => Envelope::new(req.role.login_tag())
                .with_field("email", req.email.as_str())
                .with_field("password", req.password.as_str()),
            Event::LoginSuccess(user) => Envelope::new(MessageType::LoginSuccess)
                .with_field("email", user.email.as_str())
                .with_field("username", user.display_name.as_str())
                .with_field("userType", role_str(user.role)),
            Event::Register(req) => Envelope::new(MessageType::RegisterMember)
                .with_field("email", req.email.as_str())
                .with_field("password", req.password.as_str())
                .with_field("username", req.username.as_str()),
            Event::RegisterSuccess { message } => {
                let env = Envelope::new(MessageType::RegisterSuccess);
                match message {
                    Some(m) => env.with_field("message", m.as_str()),
                    None => env,
                }
            }
            Event::Logout { sender }
            | Event::GetUsers { sender }
            | Event::GetHistory { sender }
            | Event::GetFiles { sender } => with_opt_sender(Envelope::new(self.msg_type()), sender),
            Event::UserList(users) => Envelope::new(MessageType::UserList)
                .with_field("users", serde_json::to_value(users).unwrap_or_default()),
            Event::UserJoined(n) | Event::UserLeft(n) => {
                let mut env = with_opt_sender(Envelope::new(self.msg_type()), &n.email);
                if let Some(name) = &n.username {
                    env = env.with_field("username", name.as_str());
                }
                if let Some(text) = &n.text {
                    env = env.with_content(text.as_str());
                }
                env
            }
            Event::GetConversation { sender, peer } => {
                with_opt_sender(Envelope::new(MessageType::GetConversation), sender)
                    .with_field("otherUserEmail", peer.as_str())
            }
            Event::History { tag, messages } => Envelope::new(tag.clone()).with_field(
                "messages",
                Value::Array(messages.iter().map(history_value).collect()),
            ),
            Event::Typing(sig) => {
                let env = Envelope::new(MessageType::Typing).with_sender(sig.sender.as_str());
                let env = match &sig.receiver {
                    Some(r) => env.with_receiver(r.as_str()),
                    None => env,
                };
                env.with_field("isTyping", sig.is_typing)
            }
            Event::FilesList(files) => Envelope::new(MessageType::FilesList).with_field(
                "files",
                Value::Array(files.iter().map(stored_file_value).collect()),
            ),
            Event::Error { message } => {
                Envelope::new(MessageType::Error).with_content(message.as_str())
            }
            Event::Unknown(env) => env.clone(),
        }
    }

    /// Serializes to a single-line JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        self.to_envelope().to_json()
    }
}

/// Field lookup over tag-specific extras, then over an object `content`.
struct Fields<'a> {
    env: &'a Envelope,
    content: Option<Value>,
}

impl<'a> Fields<'a> {
    fn new(env: &'a Envelope) -> Self {
        Self {
            env,
            content: env.structured_content(),
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.env.field(key).or_else(|| {
            self.content
                .as_ref()
                .and_then(Value::as_object)
                .and_then(|o| o.get(key))
                .filter(|v| !v.is_null())
        })
    }

    fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// `content` when it is plain text.
    fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }

    fn require(
        &self,
        tag: &MessageType,
        field: &'static str,
        fallback: Option<&str>,
    ) -> Result<String, ProtocolError> {
        self.str(field)
            .or(fallback)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| missing(tag, field))
    }

    /// A list carried either in `field` or as the whole `content`.
    fn list(&self, tag: &MessageType, field: &'static str) -> Result<Vec<Value>, ProtocolError> {
        let value = match self.env.field(field) {
            Some(v) => normalize_nested(v.clone()),
            None => self.content.clone().ok_or_else(|| missing(tag, field))?,
        };
        match value {
            Value::Array(items) => Ok(items),
            other => Err(ProtocolError::InvalidField {
                tag: tag.clone(),
                field,
                reason: format!("expected a list, found {}", value_kind(&other)),
            }),
        }
    }
}

fn missing(tag: &MessageType, field: &'static str) -> ProtocolError {
    ProtocolError::MissingField {
        tag: tag.clone(),
        field,
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn sender_name(env: &Envelope) -> Option<String> {
    env.str_field("username")
        .or_else(|| env.str_field("senderUsername"))
        .map(str::to_string)
}

fn decode_chat(env: &Envelope) -> Result<ChatMessage, ProtocolError> {
    let tag = &env.msg_type;
    // Chat text is taken verbatim; a message that happens to look like JSON
    // stays text.
    let text = match &env.content {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) | Some(Value::Null) | None => return Err(missing(tag, "content")),
        Some(other) => {
            return Err(ProtocolError::InvalidField {
                tag: tag.clone(),
                field: "content",
                reason: format!("expected text, found {}", value_kind(other)),
            });
        }
    };

    let sender = non_empty(&env.sender);
    let receiver = non_empty(&env.receiver);
    if *tag != MessageType::Message {
        if sender.is_none() {
            return Err(missing(tag, "sender"));
        }
        if receiver.is_none() {
            return Err(missing(tag, "receiver"));
        }
    }

    Ok(ChatMessage {
        kind: tag.clone(),
        sender,
        sender_name: sender_name(env),
        receiver,
        body: MessageBody::Text(text),
        timestamp: env.timestamp,
    })
}

fn decode_file(env: &Envelope, fields: &Fields<'_>) -> Result<ChatMessage, ProtocolError> {
    let tag = &env.msg_type;
    let filename = fields.require(tag, "filename", None)?;
    let data = fields.require(tag, "data", None)?;
    let mime = fields
        .str("type")
        .or_else(|| fields.str("fileType"))
        .or_else(|| fields.str("mimeType"))
        .unwrap_or_default();
    let file = FileContent::decode(filename, mime, &data)?;

    Ok(ChatMessage {
        kind: MessageType::File,
        sender: non_empty(&env.sender),
        sender_name: sender_name(env),
        receiver: non_empty(&env.receiver),
        body: MessageBody::File(file),
        timestamp: env.timestamp,
    })
}

fn presence_notice(env: &Envelope, fields: &Fields<'_>) -> PresenceNotice {
    PresenceNotice {
        email: non_empty(&env.sender).or_else(|| fields.str("email").map(str::to_string)),
        username: fields.str("username").map(str::to_string),
        text: fields.text().map(str::to_string),
    }
}

fn typing_flag(env: &Envelope) -> bool {
    if let Some(flag) = env.field("isTyping").and_then(Value::as_bool) {
        return flag;
    }
    match &env.content {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.trim().eq_ignore_ascii_case("false"),
        Some(Value::Object(o)) => o.get("isTyping").and_then(Value::as_bool).unwrap_or(true),
        _ => true,
    }
}

fn obj_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// One entry of a history snapshot. Entries without usable content are
/// skipped.
fn history_item(item: &Value, default_kind: &MessageType) -> Option<ChatMessage> {
    let obj = item.as_object()?;
    let kind = obj_str(obj, &["type"])
        .map(MessageType::from)
        .unwrap_or_else(|| default_kind.clone());

    let body = match obj.get("content").map(|c| normalize_nested(c.clone())) {
        Some(Value::String(s)) if !s.is_empty() => MessageBody::Text(s),
        Some(Value::Object(file)) => {
            let filename = obj_str(&file, &["filename"])?;
            let data = obj_str(&file, &["data"])?;
            let mime = obj_str(&file, &["type", "fileType", "mimeType"]).unwrap_or_default();
            MessageBody::File(FileContent::decode(filename, mime, data).ok()?)
        }
        _ => return None,
    };

    Some(ChatMessage {
        kind,
        sender: obj_str(obj, &["sender", "senderEmail"]).map(str::to_string),
        sender_name: obj_str(obj, &["username", "senderUsername"]).map(str::to_string),
        receiver: obj_str(obj, &["receiver", "receiverEmail"]).map(str::to_string),
        body,
        timestamp: obj.get("timestamp").and_then(timestamp::from_value),
    })
}

fn stored_file(item: &Value) -> Option<StoredFile> {
    let obj = item.as_object()?;
    let filename = obj_str(obj, &["filename"])?;
    let data = obj_str(obj, &["data"])?;
    let mime = obj_str(obj, &["fileType", "type", "mimeType"]).unwrap_or_default();
    let file = FileContent::decode(filename, mime, data).ok()?;

    Some(StoredFile {
        id: obj.get("id").and_then(Value::as_i64),
        file,
        sender: obj_str(obj, &["sender"]).map(str::to_string),
        receiver: obj_str(obj, &["receiver"]).map(str::to_string),
        timestamp: obj.get("timestamp").and_then(timestamp::from_value),
    })
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::Member => "member",
    }
}

fn with_opt_sender(env: Envelope, sender: &Option<String>) -> Envelope {
    match sender {
        Some(s) => env.with_sender(s.as_str()),
        None => env,
    }
}

fn file_value(file: &FileContent) -> Value {
    json!({
        "filename": file.filename(),
        "type": file.mime_type(),
        "data": file.to_data_url(),
    })
}

fn body_value(body: &MessageBody) -> Value {
    match body {
        MessageBody::Text(t) => Value::String(t.clone()),
        MessageBody::File(f) => file_value(f),
    }
}

fn chat_envelope(m: &ChatMessage) -> Envelope {
    let mut env = with_opt_sender(Envelope::new(m.kind.clone()), &m.sender);
    env.receiver = m.receiver.clone();
    env.content = Some(body_value(&m.body));
    env.timestamp = m.timestamp;
    if let Some(name) = &m.sender_name {
        env = env.with_field("username", name.as_str());
    }
    env
}

fn history_value(m: &ChatMessage) -> Value {
    let mut obj = Map::new();
    obj.insert("type".into(), Value::String(m.kind.to_string()));
    if let Some(s) = &m.sender {
        obj.insert("sender".into(), Value::String(s.clone()));
    }
    if let Some(r) = &m.receiver {
        obj.insert("receiver".into(), Value::String(r.clone()));
    }
    if let Some(n) = &m.sender_name {
        obj.insert("username".into(), Value::String(n.clone()));
    }
    obj.insert("content".into(), body_value(&m.body));
    if let Some(ts) = m.timestamp {
        obj.insert("timestamp".into(), Value::from(ts.timestamp_millis()));
    }
    Value::Object(obj)
}

fn stored_file_value(f: &StoredFile) -> Value {
    let mut obj = Map::new();
    if let Some(id) = f.id {
        obj.insert("id".into(), Value::from(id));
    }
    obj.insert("filename".into(), Value::String(f.file.filename().to_string()));
    obj.insert("fileType".into(), Value::String(f.file.mime_type().to_string()));
    obj.insert("sender".into(), f.sender.clone().map_or(Value::Null, Value::String));
    obj.insert("receiver".into(), f.receiver.clone().map_or(Value::Null, Value::String));
    if let Some(ts) = f.timestamp {
        obj.insert("timestamp".into(), Value::from(ts.timestamp_millis()));
    }
    obj.insert("data".into(), Value::String(f.file.to_data_url()));
    Value::Object(obj)
}
