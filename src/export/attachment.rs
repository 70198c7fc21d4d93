//! Save one attachment to disk, at most once.
//!
//! The checks run in a fixed order and each may end processing early:
//! dedup record, content-type filter, filename resolution, collision
//! handling. Only after all of them pass are the bytes fetched, written,
//! and recorded.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AttachError, Result};
use crate::gmail::MailboxApi;
use crate::model::{Attachment, AttachmentDescriptor, Message};
use crate::records::{record_key, DedupLog};

use super::filename::{collision_free_path, resolve_filename};

/// What happened to one attachment descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload was fetched and saved.
    Written { path: PathBuf, bytes: u64 },
    /// A previous run already saved it; nothing was fetched.
    AlreadyDownloaded,
    /// The content type did not match the filter; nothing was fetched.
    FilteredOut,
    /// No usable name or extension; nothing was fetched.
    Unnamed,
}

/// Whether `content_type` passes the filter (plain substring; empty matches all).
pub fn matches_content_type(content_type: &str, filter: &str) -> bool {
    content_type.contains(filter)
}

/// Run the full decision sequence for one descriptor of `message`.
pub fn process_attachment<A: MailboxApi + ?Sized>(
    api: &A,
    descriptor: &AttachmentDescriptor,
    message: &Message,
    dedup: &mut DedupLog,
    content_type_filter: &str,
    download_dir: &Path,
) -> Result<WriteOutcome> {
    let key = record_key(&message.id, &descriptor.filename);
    if dedup.contains(&key) {
        tracing::info!(
            message_id = %message.id,
            filename = %descriptor.filename,
            subject = %message.subject,
            "Attachment already downloaded, skipping"
        );
        return Ok(WriteOutcome::AlreadyDownloaded);
    }

    if !matches_content_type(&descriptor.content_type, content_type_filter) {
        tracing::debug!(
            content_type = %descriptor.content_type,
            filter = content_type_filter,
            "Content type does not match, skipping"
        );
        return Ok(WriteOutcome::FilteredOut);
    }

    let Some(filename) = resolve_filename(descriptor) else {
        tracing::warn!(
            message_id = %message.id,
            subject = %message.subject,
            content_type = %descriptor.content_type,
            "Skipping attachment: cannot determine an extension for an unnamed attachment"
        );
        return Ok(WriteOutcome::Unnamed);
    };

    let path = collision_free_path(download_dir, &filename);

    let attachment = fetch_attachment(api, descriptor, message)?;

    tracing::info!(
        path = %path.display(),
        message_id = %attachment.message_id,
        attachment_id = %attachment.attachment_id,
        original = %attachment.filename,
        content_type = %attachment.content_type,
        bytes = attachment.bytes.len(),
        "Writing attachment"
    );
    write_new_file(&path, &attachment.bytes)?;

    dedup.record(key)?;

    Ok(WriteOutcome::Written {
        path,
        bytes: attachment.bytes.len() as u64,
    })
}

/// Download and decode the payload of `descriptor`.
pub fn fetch_attachment<A: MailboxApi + ?Sized>(
    api: &A,
    descriptor: &AttachmentDescriptor,
    message: &Message,
) -> Result<Attachment> {
    let body = api.get_attachment(&message.id, &descriptor.attachment_id)?;
    let bytes = body.decode()?;

    if let Some(declared) = descriptor.size {
        if declared != bytes.len() as u64 {
            tracing::debug!(
                declared,
                actual = bytes.len(),
                "Attachment size differs from the declared size"
            );
        }
    }

    Ok(Attachment {
        attachment_id: descriptor.attachment_id.clone(),
        message_id: message.id.clone(),
        filename: descriptor.filename.clone(),
        content_type: descriptor.content_type.clone(),
        bytes,
    })
}

/// Write `data` to a file that must not exist yet.
fn write_new_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| AttachError::io(path, e))?;
    file.write_all(data)
        .and_then(|()| file.flush())
        .map_err(|e| AttachError::io(path, e))
}
