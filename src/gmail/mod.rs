//! The remote mailbox: Gmail API v1 operations and response shapes.
//!
//! [`MailboxApi`] is the seam between the download pipeline and the
//! network. [`client::GmailClient`] implements it over HTTPS; tests
//! substitute an in-memory mailbox.

pub mod client;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;

use crate::error::{AttachError, Result};

pub use client::GmailClient;

/// The three remote calls the pipeline depends on.
///
/// Implementations are used from a single thread. Methods take `&self` so
/// the message walker and the driver can share one instance.
pub trait MailboxApi {
    /// One page of message IDs matching `query`, starting at `page_token`.
    fn list_messages(&self, page_token: Option<&str>, query: Option<&str>) -> Result<MessageList>;

    /// Full structure of one message.
    fn get_message(&self, id: &str) -> Result<GmailMessage>;

    /// Payload of one attachment.
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<AttachmentBody>;
}

/// `users.messages.list` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// `users.messages.get` response (format `full`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// `users.messages.attachments.get` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentBody {
    /// base64url-encoded payload.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Gmail emits base64url both with and without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

impl AttachmentBody {
    /// Decode the payload bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        URL_SAFE_LENIENT
            .decode(self.data.trim())
            .map_err(|e| AttachError::Decode(e.to_string()))
    }
}

/// Google's structured error payload: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// Build a [`AttachError::RemoteFetch`] from a failed response.
///
/// Falls back to the HTTP status when the body is not the structured payload.
pub fn remote_error(status: u16, body: &str) -> AttachError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => AttachError::remote(
            envelope.error.code.unwrap_or(status),
            envelope.error.message,
        ),
        Err(_) => {
            let message = body.trim();
            if message.is_empty() {
                AttachError::remote(status, format!("HTTP {status}"))
            } else {
                AttachError::remote(status, message.chars().take(200).collect::<String>())
            }
        }
    }
}
