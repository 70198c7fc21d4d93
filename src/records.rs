//! Durable record of attachments already downloaded.
//!
//! The log is plain UTF-8 text with one record per line. A record is the
//! message ID followed directly (no delimiter) by the attachment's original
//! filename. The whole log is loaded at startup; new records are appended
//! and flushed one at a time, and the file is never rewritten.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AttachError, Result};

/// File name of the log inside the record directory.
pub const RECORD_FILENAME: &str = "records.txt";

/// Key under which a message/attachment pair is recorded.
///
/// Always built from the filename the sender declared, even when the file
/// was saved under a generated name.
pub fn record_key(message_id: &str, original_filename: &str) -> String {
    format!("{message_id}{original_filename}")
}

/// In-memory record set backed by an append-only log file.
pub struct DedupLog {
    path: PathBuf,
    records: HashSet<String>,
    writer: Box<dyn Write>,
}

impl DedupLog {
    /// Load every record from `path` and keep the file open for appending.
    ///
    /// A missing file is created empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (records, unterminated) = read_records(&path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AttachError::io(&path, e))?;
        if unterminated {
            // Keep the next record off the last line of a hand-edited log.
            writeln!(file).map_err(|e| AttachError::io(&path, e))?;
        }

        tracing::debug!(path = %path.display(), records = records.len(), "Loaded download records");
        Ok(Self {
            path,
            records,
            writer: Box::new(file),
        })
    }

    /// Load the records in `path` but append new ones through `writer`.
    ///
    /// The file at `path` is only read. Write errors are still reported
    /// against `path`.
    pub fn open_with_writer(path: impl AsRef<Path>, writer: impl Write + 'static) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (records, _) = read_records(&path)?;
        Ok(Self {
            path,
            records,
            writer: Box::new(writer),
        })
    }

    /// Open `records.txt` inside `dir`.
    pub fn open_in(dir: &Path) -> Result<Self> {
        Self::open(dir.join(RECORD_FILENAME))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains(key)
    }

    /// Add a record and flush it to disk before returning.
    pub fn record(&mut self, key: String) -> Result<()> {
        writeln!(self.writer, "{key}")
            .and_then(|()| self.writer.flush())
            .map_err(|e| AttachError::io(&self.path, e))?;
        self.records.insert(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read the existing records and whether the file lacks a final newline.
fn read_records(path: &Path) -> Result<(HashSet<String>, bool)> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((HashSet::new(), false)),
        Err(e) => return Err(AttachError::io(path, e)),
    };

    let records = content
        .lines()
        .map(str::trim_end)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    let unterminated = !content.is_empty() && !content.ends_with('\n');
    Ok((records, unterminated))
}
