use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum size of a single envelope in bytes (50 MB).
///
/// Attachments travel inline as base64, so this also bounds the largest
/// file that can be shared in one envelope.
pub const MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

/// Byte that terminates one envelope on the backend stream.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default client-facing WebSocket port of the bridge.
pub const DEFAULT_BRIDGE_PORT: u16 = 8082;

/// Default backend TCP port.
pub const DEFAULT_BACKEND_PORT: u16 = 8081;

/// Default number of consecutive connection attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Default quiet period after the last keystroke before a stop-typing signal.
pub const DEFAULT_TYPING_QUIET: Duration = Duration::from_millis(1000);

/// Default lifetime of a remote typing indicator without a refresh.
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_millis(3000);

/// Key under which the current session identity is persisted.
pub const SESSION_IDENTITY_KEY: &str = "currentUser";

/// Envelope type tag.
///
/// The canonical set is closed; anything else decodes to
/// [`MessageType::Unknown`] carrying the raw tag so it can still be routed
/// to a wildcard handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    // Chat traffic
    Message,
    PrivateMessage,
    ChatMessage,

    // Authentication
    LoginAdmin,
    LoginMember,
    LoginSuccess,
    RegisterMember,
    RegisterSuccess,
    Logout,

    // Roster
    UserList,
    GetUsers,
    UserJoined,
    UserLeft,

    // History
    GetHistory,
    GetConversation,
    ConversationHistory,
    History,

    // Presence signals
    Typing,

    // Attachments
    File,
    FilesList,
    GetFiles,

    Error,

    /// A tag outside the canonical set.
    Unknown(String),
}

impl MessageType {
    /// Every tag of the canonical set, in declaration order.
    pub const CANONICAL: [MessageType; 22] = [
        MessageType::Message,
        MessageType::PrivateMessage,
        MessageType::ChatMessage,
        MessageType::LoginAdmin,
        MessageType::LoginMember,
        MessageType::LoginSuccess,
        MessageType::RegisterMember,
        MessageType::RegisterSuccess,
        MessageType::Logout,
        MessageType::UserList,
        MessageType::GetUsers,
        MessageType::UserJoined,
        MessageType::UserLeft,
        MessageType::GetHistory,
        MessageType::GetConversation,
        MessageType::ConversationHistory,
        MessageType::History,
        MessageType::Typing,
        MessageType::File,
        MessageType::FilesList,
        MessageType::GetFiles,
        MessageType::Error,
    ];

    /// Wire representation of the tag.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Message => "message",
            MessageType::PrivateMessage => "private_message",
            MessageType::ChatMessage => "chat_message",
            MessageType::LoginAdmin => "login_admin",
            MessageType::LoginMember => "login_member",
            MessageType::LoginSuccess => "login_success",
            MessageType::RegisterMember => "register_member",
            MessageType::RegisterSuccess => "register_success",
            MessageType::Logout => "logout",
            MessageType::UserList => "user_list",
            MessageType::GetUsers => "get_users",
            MessageType::UserJoined => "user_joined",
            MessageType::UserLeft => "user_left",
            MessageType::GetHistory => "get_history",
            MessageType::GetConversation => "get_conversation",
            MessageType::ConversationHistory => "conversation_history",
            MessageType::History => "history",
            MessageType::Typing => "typing",
            MessageType::File => "file",
            MessageType::FilesList => "files_list",
            MessageType::GetFiles => "get_files",
            MessageType::Error => "error",
            MessageType::Unknown(tag) => tag,
        }
    }

    /// Returns `true` for tags carrying a chat line.
    pub fn is_chat(&self) -> bool {
        matches!(
            self,
            MessageType::Message | MessageType::PrivateMessage | MessageType::ChatMessage
        )
    }

    /// Returns `true` for tags outside the canonical set.
    pub fn is_unknown(&self) -> bool {
        matches!(self, MessageType::Unknown(_))
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "message" => MessageType::Message,
            "private_message" => MessageType::PrivateMessage,
            "chat_message" => MessageType::ChatMessage,
            "login_admin" => MessageType::LoginAdmin,
            "login_member" => MessageType::LoginMember,
            "login_success" => MessageType::LoginSuccess,
            "register_member" => MessageType::RegisterMember,
            "register_success" => MessageType::RegisterSuccess,
            "logout" => MessageType::Logout,
            "user_list" => MessageType::UserList,
            "get_users" => MessageType::GetUsers,
            "user_joined" => MessageType::UserJoined,
            "user_left" => MessageType::UserLeft,
            "get_history" => MessageType::GetHistory,
            "get_conversation" => MessageType::GetConversation,
            "conversation_history" => MessageType::ConversationHistory,
            "history" => MessageType::History,
            "typing" => MessageType::Typing,
            "file" => MessageType::File,
            "files_list" => MessageType::FilesList,
            "get_files" => MessageType::GetFiles,
            "error" => MessageType::Error,
            _ => MessageType::Unknown(tag),
        }
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        MessageType::from(tag.to_string())
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Unknown(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
