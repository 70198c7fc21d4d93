//! The download run: walk the mailbox and save every matching attachment.
//!
//! Failures of a single message or attachment are logged and skipped so one
//! bad item does not end the run. A failure to list messages ends the walk
//! early. Fatal errors (authorization, configuration) abort, as does a
//! failure to write the download records, since those records are what keep
//! the next run from downloading everything again.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{AttachError, Result};
use crate::export::{process_attachment, WriteOutcome};
use crate::gmail::MailboxApi;
use crate::mailbox::{list_messages, load_message};
use crate::records::DedupLog;

/// What to download and where.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Gmail search query. Empty = all messages.
    pub query: String,
    /// Content-type substring filter. Empty = any type.
    pub content_type: String,
    /// Directory attachments are written into.
    pub download_dir: PathBuf,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub messages_scanned: u64,
    pub attachments_seen: u64,
    pub files_written: u64,
    pub bytes_written: u64,
    pub already_downloaded: u64,
    pub filtered_out: u64,
    pub unnamed: u64,
    pub failed_messages: u64,
    pub failed_attachments: u64,
    /// Whether the listing failed before the mailbox was fully walked.
    pub listing_incomplete: bool,
}

impl RunStats {
    /// Anything went wrong that the user should look at.
    pub fn has_failures(&self) -> bool {
        self.failed_messages > 0 || self.failed_attachments > 0 || self.listing_incomplete
    }
}

/// Download every attachment of every matching message.
///
/// `progress` is called after each message with the running totals.
pub fn download_attachments<A: MailboxApi + ?Sized>(
    api: &A,
    dedup: &mut DedupLog,
    options: &DownloadOptions,
    progress: Option<&dyn Fn(&RunStats)>,
) -> Result<RunStats> {
    let mut stats = RunStats::default();

    for summary in list_messages(api, &options.query) {
        let summary = match summary {
            Ok(s) => s,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "Failed to list messages, stopping early");
                stats.listing_incomplete = true;
                break;
            }
        };
        stats.messages_scanned += 1;

        let message = match load_message(api, &summary.id) {
            Ok(m) => m,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(message_id = %summary.id, error = %e, "Failed to load message, skipping");
                stats.failed_messages += 1;
                continue;
            }
        };
        tracing::debug!(message_id = %message.id, subject = %message.subject, "Email");
        if !message.has_attachments() {
            tracing::debug!(message_id = %message.id, "No attachments");
        }

        for descriptor in &message.attachments {
            stats.attachments_seen += 1;
            let outcome = process_attachment(
                api,
                descriptor,
                &message,
                dedup,
                &options.content_type,
                &options.download_dir,
            );

            match outcome {
                Ok(WriteOutcome::Written { bytes, .. }) => {
                    stats.files_written += 1;
                    stats.bytes_written += bytes;
                }
                Ok(WriteOutcome::AlreadyDownloaded) => stats.already_downloaded += 1,
                Ok(WriteOutcome::FilteredOut) => stats.filtered_out += 1,
                Ok(WriteOutcome::Unnamed) => {
                    let err = AttachError::UnresolvableFilename {
                        message_id: message.id.clone(),
                        content_type: descriptor.content_type.clone(),
                    };
                    tracing::debug!(error = %err, "Attachment skipped");
                    stats.unnamed += 1;
                }
                Err(e) if e.is_fatal() || is_record_failure(&e, dedup) => return Err(e),
                Err(e) => {
                    tracing::error!(
                        message_id = %message.id,
                        filename = %descriptor.filename,
                        error = %e,
                        "Failed to save attachment, skipping"
                    );
                    stats.failed_attachments += 1;
                }
            }
        }

        if let Some(cb) = progress {
            cb(&stats);
        }
    }

    tracing::info!(
        messages = stats.messages_scanned,
        written = stats.files_written,
        skipped = stats.already_downloaded,
        "Download run finished"
    );
    Ok(stats)
}

fn is_record_failure(err: &AttachError, dedup: &DedupLog) -> bool {
    matches!(err, AttachError::Io { path, .. } if path == dedup.path())
}
