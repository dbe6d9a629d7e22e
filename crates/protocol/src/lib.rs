//! Wire protocol shared by the relaychat bridge and client.
//!
//! Envelopes are single JSON objects tagged by `type`. The client-facing
//! transport carries one envelope per WebSocket text frame; the backend
//! transport carries one envelope per newline-terminated line.

pub mod attachment;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod event;
pub mod types;

// Re-export primary types for convenience.
pub use attachment::{Disposition, FileContent};
pub use constants::MessageType;
pub use envelope::Envelope;
pub use error::{AttachmentError, ProtocolError};
pub use event::Event;
pub use types::{
    ChatMessage, LoginRequest, MessageBody, Presence, PresenceNotice, RegisterRequest, Role,
    StoredFile, TypingSignal, User,
};
