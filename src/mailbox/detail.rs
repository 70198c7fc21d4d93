//! Message detail: headers of interest and attachment descriptors.

use crate::error::Result;
use crate::gmail::{GmailMessage, Header, MailboxApi, MessagePart};
use crate::model::{AttachmentDescriptor, Message};

/// Fetch one message and extract what the download pipeline needs.
pub fn load_message<A: MailboxApi + ?Sized>(api: &A, message_id: &str) -> Result<Message> {
    let raw = api.get_message(message_id)?;
    Ok(message_from_api(message_id, &raw))
}

/// Build a [`Message`] from the API structure.
pub fn message_from_api(message_id: &str, raw: &GmailMessage) -> Message {
    let (date, sender, subject) = header_info(&raw.payload.headers);

    if date.is_none() {
        tracing::warn!(message_id, "Message has no Date header");
    }
    if sender.is_none() {
        tracing::warn!(message_id, "Message has no From header");
    }

    let attachments = attachment_descriptors(&raw.payload);
    for att in &attachments {
        tracing::debug!(
            message_id,
            filename = %att.filename,
            content_type = %att.content_type,
            size = ?att.size,
            "Attachment found"
        );
    }

    Message {
        id: message_id.to_string(),
        date,
        sender,
        subject: subject.unwrap_or_default(),
        attachments,
    }
}

/// Scan the headers once; the last `Date`, `From` and `Subject` win.
fn header_info(headers: &[Header]) -> (Option<String>, Option<String>, Option<String>) {
    let mut date = None;
    let mut sender = None;
    let mut subject = None;

    for header in headers {
        let name = header.name.to_ascii_lowercase();
        match name.as_str() {
            "date" => date = Some(header.value.clone()),
            "from" => sender = Some(header.value.clone()),
            "subject" => subject = Some(header.value.clone()),
            _ => {}
        }
    }
    (date, sender, subject)
}

/// Descriptors for the top-level parts that carry an attachment ID.
///
/// Nested multipart structures are not descended into.
fn attachment_descriptors(payload: &MessagePart) -> Vec<AttachmentDescriptor> {
    let Some(parts) = &payload.parts else {
        return Vec::new();
    };

    parts
        .iter()
        .filter_map(|part| {
            let body = part.body.as_ref()?;
            let attachment_id = body.attachment_id.as_ref()?;

            let content_type = part
                .headers
                .iter()
                .rev()
                .find(|h| h.name.eq_ignore_ascii_case("content-type"))
                .map(|h| h.value.clone())
                .or_else(|| part.mime_type.clone())
                .unwrap_or_default();

            Some(AttachmentDescriptor {
                attachment_id: attachment_id.clone(),
                filename: part.filename.clone().unwrap_or_default(),
                content_type,
                size: body.size.filter(|&s| s != 0),
            })
        })
        .collect()
}
