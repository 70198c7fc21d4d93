//! Message summary and message detail types.

use super::attachment::AttachmentDescriptor;

/// Minimal identifier returned by a listing call.
///
/// Held only long enough to fetch the full message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageSummary {
    /// Gmail message ID.
    pub id: String,
}

impl MessageSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Full message detail, scoped to one iteration step.
///
/// Only the headers needed for logging are kept; the body is never loaded.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Message {
    /// Gmail message ID.
    pub id: String,

    /// Raw `Date:` header value, if the message has one.
    pub date: Option<String>,

    /// Raw `From:` header value, if the message has one.
    pub sender: Option<String>,

    /// `Subject:` header value. Empty when absent.
    pub subject: String,

    /// Attachment descriptors in top-level part order.
    pub attachments: Vec<AttachmentDescriptor>,
}

impl Message {
    /// Whether the message carries at least one attachment descriptor.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}
