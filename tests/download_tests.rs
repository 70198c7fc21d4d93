//! Integration tests for the download run against an in-memory mailbox.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use predicates::prelude::*;
use serde_json::json;

use attachback::download::{download_attachments, DownloadOptions, RunStats};
use attachback::error::{AttachError, Result};
use attachback::gmail::{AttachmentBody, GmailMessage, MailboxApi, MessageList, MessageRef};
use attachback::records::{record_key, DedupLog, RECORD_FILENAME};

// ─── In-memory mailbox ──────────────────────────────────────────────

#[derive(Default)]
struct FakeMailbox {
    /// Pages keyed by the page token that requests them.
    pages: HashMap<Option<String>, MessageList>,
    messages: HashMap<String, GmailMessage>,
    payloads: HashMap<(String, String), Vec<u8>>,
    broken_messages: HashSet<String>,
    broken_attachments: HashSet<String>,
    revoked_after: Option<String>,
    list_calls: RefCell<Vec<Option<String>>>,
    attachment_fetches: Cell<usize>,
}

/// One attachment part: (attachment id, filename, content type, payload).
type Part<'a> = (&'a str, &'a str, &'a str, &'a str);

impl FakeMailbox {
    fn page(mut self, token: Option<&str>, ids: &[&str], next: Option<&str>) -> Self {
        let list = MessageList {
            messages: ids
                .iter()
                .map(|id| MessageRef {
                    id: (*id).to_string(),
                    thread_id: None,
                })
                .collect(),
            next_page_token: next.map(str::to_string),
            result_size_estimate: Some(ids.len() as u64),
        };
        self.pages.insert(token.map(str::to_string), list);
        self
    }

    fn message(mut self, id: &str, parts: &[Part<'_>]) -> Self {
        let json_parts: Vec<_> = std::iter::once(json!({
            "mimeType": "text/plain",
            "filename": "",
            "body": { "size": 5, "data": "aGVsbG8" }
        }))
        .chain(parts.iter().map(|(att_id, filename, content_type, payload)| {
            json!({
                "mimeType": content_type,
                "filename": filename,
                "headers": [{ "name": "Content-Type", "value": content_type }],
                "body": { "attachmentId": att_id, "size": payload.len() }
            })
        }))
        .collect();

        let raw = json!({
            "id": id,
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    { "name": "Date", "value": "Tue, 2 Jan 2024 10:00:00 +0000" },
                    { "name": "From", "value": "sender@example.com" },
                    { "name": "Subject", "value": format!("Message {id}") }
                ],
                "parts": json_parts
            }
        });
        let message: GmailMessage = serde_json::from_value(raw).unwrap();
        self.messages.insert(id.to_string(), message);

        for (att_id, _, _, payload) in parts {
            self.payloads
                .insert((id.to_string(), (*att_id).to_string()), payload.as_bytes().to_vec());
        }
        self
    }

    fn break_message(mut self, id: &str) -> Self {
        self.broken_messages.insert(id.to_string());
        self
    }

    fn break_attachment(mut self, attachment_id: &str) -> Self {
        self.broken_attachments.insert(attachment_id.to_string());
        self
    }

    /// Credentials stop refreshing once `id` is requested.
    fn revoke_at(mut self, id: &str) -> Self {
        self.revoked_after = Some(id.to_string());
        self
    }

    fn fetches(&self) -> usize {
        self.attachment_fetches.get()
    }
}

impl MailboxApi for FakeMailbox {
    fn list_messages(&self, page_token: Option<&str>, _query: Option<&str>) -> Result<MessageList> {
        let token = page_token.map(str::to_string);
        self.list_calls.borrow_mut().push(token.clone());
        self.pages
            .get(&token)
            .cloned()
            .ok_or_else(|| AttachError::remote(400, "Invalid pageToken"))
    }

    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        if self.revoked_after.as_deref() == Some(id) {
            return Err(AttachError::AuthRefresh(
                "invalid_grant - Token has been expired or revoked.".into(),
            ));
        }
        if self.broken_messages.contains(id) {
            return Err(AttachError::remote(500, "Backend Error"));
        }
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| AttachError::remote(404, "Requested entity was not found."))
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<AttachmentBody> {
        self.attachment_fetches.set(self.attachment_fetches.get() + 1);
        if self.broken_attachments.contains(attachment_id) {
            return Err(AttachError::remote(503, "Service Unavailable"));
        }
        let bytes = self
            .payloads
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .ok_or_else(|| AttachError::remote(404, "Attachment not found"))?;
        Ok(AttachmentBody {
            data: URL_SAFE.encode(bytes),
            size: Some(bytes.len() as u64),
        })
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn options(download_dir: &Path, content_type: &str) -> DownloadOptions {
    DownloadOptions {
        query: "has:attachment".to_string(),
        content_type: content_type.to_string(),
        download_dir: download_dir.to_path_buf(),
    }
}

fn run(api: &FakeMailbox, dir: &TempDir, content_type: &str) -> RunStats {
    let mut dedup = DedupLog::open_in(dir.path()).unwrap();
    download_attachments(api, &mut dedup, &options(dir.path(), content_type), None).unwrap()
}

fn saved_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != RECORD_FILENAME)
        .collect();
    names.sort();
    names
}

fn record_lines(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join(RECORD_FILENAME))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[test]
fn test_messages_without_attachments_write_nothing() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message("m1", &[])
        .message("m2", &[]);

    let stats = run(&api, &dir, "");

    assert_eq!(stats.messages_scanned, 2);
    assert_eq!(stats.attachments_seen, 0);
    assert_eq!(api.fetches(), 0);
    assert!(saved_files(dir.path()).is_empty());
    assert!(record_lines(dir.path()).is_empty());
}

#[test]
fn test_saves_attachment_and_records_it() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1"], None)
        .message("m1", &[("a1", "invoice.pdf", "application/pdf", "%PDF-1.4 data")]);

    let stats = run(&api, &dir, "");

    assert_eq!(stats.files_written, 1);
    assert_eq!(stats.bytes_written, 13);
    dir.child("invoice.pdf").assert("%PDF-1.4 data");
    assert_eq!(record_lines(dir.path()), vec![record_key("m1", "invoice.pdf")]);
}

#[test]
fn test_second_run_downloads_nothing() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message("m1", &[("a1", "photo.png", "image/png", "png-bytes")])
        .message(
            "m2",
            &[
                ("a2", "notes.txt", "text/plain", "notes"),
                ("a3", "scan.jpg", "image/jpeg", "jpeg-bytes"),
            ],
        );

    let first = run(&api, &dir, "");
    assert_eq!(first.files_written, 3);
    let fetches_after_first = api.fetches();
    let files_after_first = saved_files(dir.path());

    let second = run(&api, &dir, "");
    assert_eq!(second.files_written, 0);
    assert_eq!(second.already_downloaded, 3);
    assert_eq!(api.fetches(), fetches_after_first, "no payload fetched twice");
    assert_eq!(saved_files(dir.path()), files_after_first);
    assert_eq!(record_lines(dir.path()).len(), 3);
}

#[test]
fn test_existing_record_skips_fetch() {
    let dir = TempDir::new().unwrap();
    dir.child(RECORD_FILENAME)
        .write_str(&format!("{}\n", record_key("m1", "report.pdf")))
        .unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1"], None)
        .message("m1", &[("a1", "report.pdf", "application/pdf", "pdf")]);

    let stats = run(&api, &dir, "");

    assert_eq!(stats.already_downloaded, 1);
    assert_eq!(api.fetches(), 0);
    dir.child("report.pdf").assert(predicate::path::missing());
}

#[test]
fn test_empty_page_with_cursor_continues() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2"], Some("X"))
        .page(Some("X"), &[], Some("Y"))
        .page(Some("Y"), &["m3"], None)
        .message("m1", &[])
        .message("m2", &[])
        .message("m3", &[("a3", "late.csv", "text/csv", "a,b\n1,2\n")]);

    let stats = run(&api, &dir, "");

    assert_eq!(stats.messages_scanned, 3);
    assert_eq!(stats.files_written, 1);
    assert_eq!(
        *api.list_calls.borrow(),
        vec![None, Some("X".to_string()), Some("Y".to_string())]
    );
    dir.child("late.csv").assert("a,b\n1,2\n");
}

#[test]
fn test_name_collision_keeps_both_files() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message("m1", &[("a1", "report.pdf", "application/pdf", "first report")])
        .message("m2", &[("a2", "report.pdf", "application/pdf", "second report")]);

    let stats = run(&api, &dir, "");

    assert_eq!(stats.files_written, 2);
    dir.child("report.pdf").assert("first report");

    let files = saved_files(dir.path());
    assert_eq!(files.len(), 2);
    let renamed = files
        .iter()
        .find(|n| n.as_str() != "report.pdf")
        .expect("renamed copy");
    assert!(renamed.ends_with("-report.pdf"), "got {renamed}");
    dir.child(renamed).assert("second report");

    assert_eq!(
        record_lines(dir.path()),
        vec![record_key("m1", "report.pdf"), record_key("m2", "report.pdf")]
    );
}

#[test]
fn test_pre_existing_file_is_not_overwritten() {
    let dir = TempDir::new().unwrap();
    dir.child("data.json").write_str("{\"mine\":true}").unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1"], None)
        .message("m1", &[("a1", "data.json", "application/json", "{}")]);

    let stats = run(&api, &dir, "");

    assert_eq!(stats.files_written, 1);
    dir.child("data.json").assert("{\"mine\":true}");
    assert_eq!(saved_files(dir.path()).len(), 2);
}

#[test]
fn test_content_type_filter_selects_images() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1"], None)
        .message(
            "m1",
            &[
                ("a1", "a.png", "image/png", "png"),
                ("a2", "b.pdf", "application/pdf", "pdf"),
                ("a3", "c.jpg", "image/jpeg", "jpg"),
            ],
        );

    let stats = run(&api, &dir, "image/");

    assert_eq!(stats.files_written, 2);
    assert_eq!(stats.filtered_out, 1);
    assert_eq!(api.fetches(), 2);
    assert_eq!(saved_files(dir.path()), vec!["a.png", "c.jpg"]);
    assert!(!record_lines(dir.path()).contains(&record_key("m1", "b.pdf")));
}

#[test]
fn test_generated_name_is_keyed_by_original_name() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1"], None)
        .message("m1", &[("a1", "q3:summary", "application/pdf", "pdf body")]);

    let first = run(&api, &dir, "");
    assert_eq!(first.files_written, 1);

    let files = saved_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("temp"), "got {}", files[0]);
    assert!(files[0].ends_with(".pdf"), "got {}", files[0]);
    assert_eq!(record_lines(dir.path()), vec!["m1q3:summary".to_string()]);

    let second = run(&api, &dir, "");
    assert_eq!(second.files_written, 0);
    assert_eq!(second.already_downloaded, 1);
    assert_eq!(saved_files(dir.path()).len(), 1);
}

#[test]
fn test_unnamed_attachment_without_extension_is_skipped() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1"], None)
        .message("m1", &[("a1", "", "application/x-attachback-unknown", "???")]);

    let stats = run(&api, &dir, "");

    assert_eq!(stats.unnamed, 1);
    assert_eq!(stats.files_written, 0);
    assert_eq!(api.fetches(), 0);
    assert!(saved_files(dir.path()).is_empty());
    assert!(record_lines(dir.path()).is_empty());
}

#[test]
fn test_failed_attachment_fetch_is_skipped() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message(
            "m1",
            &[
                ("bad", "broken.zip", "application/zip", "zip"),
                ("a2", "fine.txt", "text/plain", "fine"),
            ],
        )
        .message("m2", &[("a3", "later.txt", "text/plain", "later")])
        .break_attachment("bad");

    let stats = run(&api, &dir, "");

    assert_eq!(stats.failed_attachments, 1);
    assert_eq!(stats.files_written, 2);
    assert!(stats.has_failures());
    dir.child("broken.zip").assert(predicate::path::missing());
    dir.child("fine.txt").assert("fine");
    dir.child("later.txt").assert("later");
    assert!(!record_lines(dir.path()).contains(&record_key("m1", "broken.zip")));
}

#[test]
fn test_failed_message_is_skipped() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message("m1", &[("a1", "lost.txt", "text/plain", "lost")])
        .message("m2", &[("a2", "kept.txt", "text/plain", "kept")])
        .break_message("m1");

    let stats = run(&api, &dir, "");

    assert_eq!(stats.messages_scanned, 2);
    assert_eq!(stats.failed_messages, 1);
    assert_eq!(stats.files_written, 1);
    dir.child("kept.txt").assert("kept");
    dir.child("lost.txt").assert(predicate::path::missing());
}

#[test]
fn test_listing_failure_stops_run() {
    let dir = TempDir::new().unwrap();
    // The second page is never registered, so requesting it fails.
    let api = FakeMailbox::default()
        .page(None, &["m1"], Some("gone"))
        .message("m1", &[("a1", "first.txt", "text/plain", "first")]);

    let stats = run(&api, &dir, "");

    assert!(stats.listing_incomplete);
    assert_eq!(stats.messages_scanned, 1);
    assert_eq!(stats.files_written, 1);
    assert_eq!(api.list_calls.borrow().len(), 2);
}

#[test]
fn test_progress_called_per_message() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2", "m3"], None)
        .message("m1", &[])
        .message("m2", &[("a2", "x.txt", "text/plain", "x")])
        .message("m3", &[]);

    let seen = RefCell::new(Vec::new());
    let record = |s: &RunStats| seen.borrow_mut().push((s.messages_scanned, s.files_written));
    let progress: &dyn Fn(&RunStats) = &record;
    let mut dedup = DedupLog::open_in(dir.path()).unwrap();
    download_attachments(&api, &mut dedup, &options(dir.path(), ""), Some(progress)).unwrap();

    assert_eq!(*seen.borrow(), vec![(1, 0), (2, 1), (3, 1)]);
}

#[test]
fn test_refresh_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2", "m3"], None)
        .message("m1", &[("a1", "one.txt", "text/plain", "one")])
        .message("m2", &[("a2", "two.txt", "text/plain", "two")])
        .message("m3", &[("a3", "three.txt", "text/plain", "three")])
        .revoke_at("m2");

    let mut dedup = DedupLog::open_in(dir.path()).unwrap();
    let err = download_attachments(&api, &mut dedup, &options(dir.path(), ""), None).unwrap_err();

    assert!(matches!(err, AttachError::AuthRefresh(_)));
    dir.child("one.txt").assert("one");
    dir.child("three.txt").assert(predicate::path::missing());
    assert_eq!(record_lines(dir.path()), vec![record_key("m1", "one.txt")]);
}

struct FailingLog;

impl std::io::Write for FailingLog {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("No space left on device"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_record_write_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let api = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message("m1", &[("a1", "first.txt", "text/plain", "first")])
        .message("m2", &[("a2", "second.txt", "text/plain", "second")]);

    let mut dedup = DedupLog::open_with_writer(dir.path().join(RECORD_FILENAME), FailingLog).unwrap();
    let err = download_attachments(&api, &mut dedup, &options(dir.path(), ""), None).unwrap_err();

    assert!(matches!(err, AttachError::Io { ref path, .. } if path == dedup.path()));
    // The file written before the record failed stays; nothing later runs.
    dir.child("first.txt").assert("first");
    dir.child("second.txt").assert(predicate::path::missing());
    assert_eq!(api.fetches(), 1);
}
