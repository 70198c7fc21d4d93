//! Attachment metadata and payload.
//!
//! Descriptors are built from the message structure alone. The binary
//! payload is only fetched once a descriptor has passed every check.

/// Metadata about a Gmail attachment, obtainable without fetching its bytes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentDescriptor {
    /// Remote attachment ID used to fetch the payload.
    pub attachment_id: String,

    /// Filename as declared by the sender. May be empty.
    pub filename: String,

    /// Declared `Content-Type` header value (e.g. `"image/png; name=a.png"`). May be empty.
    pub content_type: String,

    /// Declared size in bytes, when the API reports a non-zero value.
    pub size: Option<u64>,
}

impl AttachmentDescriptor {
    /// The MIME type without parameters, e.g. `"application/pdf"`.
    pub fn mime_type(&self) -> &str {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
    }
}

/// A fetched attachment payload.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub attachment_id: String,
    pub message_id: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}
