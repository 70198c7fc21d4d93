//! Core data model types for Gmail messages and their attachments.

pub mod attachment;
pub mod mail;

pub use attachment::{Attachment, AttachmentDescriptor};
pub use mail::{Message, MessageSummary};
