//! Whole-file attachment codec.
//!
//! A file travels inline inside one `file` envelope as
//! `{"filename": .., "type": <mime>, "data": "data:<mime>;base64,<payload>"}`.
//! There is no chunking: the entire file becomes one envelope, so the
//! largest shareable file is bounded by the envelope size limit.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::AttachmentError;

/// MIME type used when nothing better is known.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// How a received attachment should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Render inline (image MIME types).
    InlinePreview,
    /// Offer an explicit save/download action.
    Download,
}

/// A decoded file attachment.
///
/// Immutable once constructed; clones share the same byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    filename: String,
    mime_type: String,
    data: Arc<[u8]>,
}

impl FileContent {
    /// Builds an attachment from in-memory bytes.
    ///
    /// An empty MIME type falls back to [`DEFAULT_MIME_TYPE`].
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let mime_type = mime_type.into();
        let data: Vec<u8> = data.into();
        Self {
            filename: filename.into(),
            mime_type: if mime_type.is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                mime_type
            },
            data: Arc::from(data),
        }
    }

    /// Reads a whole file from disk, guessing its MIME type from the extension.
    pub fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AttachmentError::InvalidFilename(path.display().to_string()))?
            .to_string();
        let mime = guess_mime_type(&filename);
        let data = std::fs::read(path)?;
        Ok(Self::new(filename, mime, data))
    }

    /// Decodes an attachment from its inline payload.
    ///
    /// `data` may be a `data:` URL or bare base64. When `mime_type` is empty
    /// the type embedded in the data URL is used.
    pub fn decode(
        filename: impl Into<String>,
        mime_type: &str,
        data: &str,
    ) -> Result<Self, AttachmentError> {
        let (embedded_mime, bytes) = decode_payload(data)?;
        let mime = if mime_type.is_empty() {
            embedded_mime.unwrap_or_default()
        } else {
            mime_type.to_string()
        };
        Ok(Self::new(filename, mime, bytes))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` when the MIME type indicates an image.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Presentation hint for this attachment.
    pub fn disposition(&self) -> Disposition {
        if self.is_image() {
            Disposition::InlinePreview
        } else {
            Disposition::Download
        }
    }

    /// Self-describing `data:` URL carrying the MIME type and base64 bytes.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    /// Writes the attachment into `dir` under its own filename.
    ///
    /// The filename must be a single plain path component; anything that
    /// would escape `dir` is rejected.
    pub fn save_into(&self, dir: &Path) -> Result<PathBuf, AttachmentError> {
        let name = safe_filename(&self.filename)?;
        let target = dir.join(name);
        std::fs::write(&target, &self.data)?;
        Ok(target)
    }
}

/// Splits a payload into (embedded MIME type, bytes).
fn decode_payload(data: &str) -> Result<(Option<String>, Vec<u8>), AttachmentError> {
    let data = data.trim();
    let (mime, encoded) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or(AttachmentError::MalformedDataUrl)?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or(AttachmentError::MalformedDataUrl)?;
            let mime = (!mime.is_empty()).then(|| mime.to_string());
            (mime, payload)
        }
        None => (None, data),
    };

    if encoded.is_empty() {
        return Err(AttachmentError::Empty);
    }
    Ok((mime, STANDARD.decode(encoded)?))
}

/// Validates that an attachment filename is a single plain component.
fn safe_filename(filename: &str) -> Result<&str, AttachmentError> {
    if filename.is_empty() {
        return Err(AttachmentError::InvalidFilename("empty filename".into()));
    }
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(filename),
        _ => Err(AttachmentError::InvalidFilename(filename.to_string())),
    }
}

/// Best-effort MIME type from a filename extension.
pub fn guess_mime_type(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") | Some("log") => "text/plain",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => DEFAULT_MIME_TYPE,
    }
}
