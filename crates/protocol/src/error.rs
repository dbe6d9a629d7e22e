use crate::constants::MessageType;

/// Errors produced while decoding or validating envelopes.
///
/// These never escalate past the decode boundary: the offending envelope is
/// dropped and processing continues.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{tag} envelope is missing required field `{field}`")]
    MissingField {
        tag: MessageType,
        field: &'static str,
    },

    #[error("{tag} envelope has invalid field `{field}`: {reason}")]
    InvalidField {
        tag: MessageType,
        field: &'static str,
        reason: String,
    },

    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),
}

/// Errors from the file attachment codec.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("malformed data URL")]
    MalformedDataUrl,

    #[error("empty attachment payload")]
    Empty,

    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}
