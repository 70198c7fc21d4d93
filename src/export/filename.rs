//! Portable file naming for downloaded attachments.
//!
//! Names must be valid on Windows as well as Unix, so the stricter rules
//! apply everywhere.

use std::path::{Path, PathBuf};

use crate::model::AttachmentDescriptor;

/// Characters Windows refuses in file names.
const INVALID_CHARS: &[char] = &['\\', '/', ':', '"', '?', '<', '>', '|'];

/// Canonical extensions for types whose `mime_guess` candidates are listed
/// alphabetically with an obscure one first (`application/octet-stream`
/// would otherwise become `.aaf`).
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("application/octet-stream", "bin"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.ms-powerpoint", "ppt"),
    ("application/msword", "doc"),
    ("application/xml", "xml"),
    ("text/xml", "xml"),
    ("application/javascript", "js"),
    ("application/postscript", "ps"),
    ("application/x-tar", "tar"),
    ("application/gzip", "gz"),
    ("application/zip", "zip"),
    ("application/rtf", "rtf"),
    ("message/rfc822", "eml"),
    ("image/jpeg", "jpg"),
    ("image/tiff", "tiff"),
    ("image/svg+xml", "svg"),
    ("image/x-icon", "ico"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/calendar", "ics"),
    ("text/csv", "csv"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/x-wav", "wav"),
    ("video/mpeg", "mpeg"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
];

/// Whether `name` can be used verbatim as a file name.
///
/// Rejects empty names, names containing `\ / : " ? < > |`, names ending in
/// a period, and names whose stem ends in a period (`a..txt`).
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() {
        tracing::debug!("Filename rejected: empty");
        return false;
    }

    if name.contains(INVALID_CHARS) {
        tracing::debug!(name, "Filename rejected: contains one of \\/:\"?<>|");
        return false;
    }

    let chunks: Vec<&str> = name.split('.').collect();
    if chunks.last().is_some_and(|c| c.is_empty()) {
        tracing::debug!(name, "Filename rejected: ends in a period");
        return false;
    }
    if chunks.len() > 2 && chunks[chunks.len() - 2].is_empty() {
        tracing::debug!(name, "Filename rejected: stem ends in a period");
        return false;
    }

    true
}

/// File extension (without dot) for a MIME type such as `"application/pdf"`.
pub fn extension_for(mime_type: &str) -> Option<&'static str> {
    let mime = mime_type.trim().to_ascii_lowercase();
    if mime.is_empty() {
        return None;
    }

    if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(m, _)| *m == mime) {
        return Some(*ext);
    }
    let candidates = mime_guess::get_mime_extensions_str(&mime)?;
    // Prefer an extension that maps back to this very type.
    candidates
        .iter()
        .find(|ext| {
            mime_guess::from_ext(ext)
                .first_raw()
                .is_some_and(|m| m.eq_ignore_ascii_case(&mime))
        })
        .or_else(|| candidates.first())
        .copied()
}

/// Wall-clock timestamp as `seconds.micros`, used to make names unique.
pub fn timestamp() -> String {
    let now = chrono::Utc::now();
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

/// Name for an attachment whose own name is missing or unusable.
pub fn generated_filename(extension: &str) -> String {
    format!("temp{}.{}", timestamp(), extension)
}

/// The name an attachment will be saved under, before collision handling.
///
/// Returns `None` when the declared name is unusable and no extension can be
/// derived from the content type.
pub fn resolve_filename(descriptor: &AttachmentDescriptor) -> Option<String> {
    if is_valid_filename(&descriptor.filename) {
        return Some(descriptor.filename.clone());
    }

    let extension = extension_for(descriptor.mime_type())?;
    let name = generated_filename(extension);
    tracing::info!(
        original = %descriptor.filename,
        generated = %name,
        "Invalid or missing filename, using a generated one"
    );
    Some(name)
}

/// A path in `dir` for `name` that does not exist yet.
///
/// If `dir/name` is taken, a `"<timestamp>-"` prefix is added.
pub fn collision_free_path(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if !path.exists() {
        return path;
    }

    tracing::info!(name, "File already exists, renaming");
    let stamp = timestamp();
    let candidate = dir.join(format!("{stamp}-{name}"));
    if !candidate.exists() {
        return candidate;
    }

    for i in 1..1000 {
        let candidate = dir.join(format!("{stamp}-{i}-{name}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    // Fallback, very unlikely
    dir.join(format!("{}-{name}", timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(filename: &str, content_type: &str) -> AttachmentDescriptor {
        AttachmentDescriptor {
            attachment_id: "att".into(),
            filename: filename.into(),
            content_type: content_type.into(),
            size: None,
        }
    }

    #[test]
    fn test_filename_validity() {
        assert!(is_valid_filename("a.txt"));
        assert!(is_valid_filename("report"));
        assert!(is_valid_filename("archive.tar.gz"));
        assert!(is_valid_filename(".bashrc"));

        assert!(!is_valid_filename(""));
        assert!(!is_valid_filename("a."));
        assert!(!is_valid_filename("a..txt"));
        assert!(!is_valid_filename("a|b.txt"));
        for bad in ["a\\b", "a/b", "c:d", "q\"", "why?", "<x>"] {
            assert!(!is_valid_filename(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("application/pdf"), Some("pdf"));
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("IMAGE/PNG"), Some("png"));
        assert_eq!(extension_for("application/octet-stream"), Some("bin"));
        assert_eq!(extension_for("application/vnd.ms-excel"), Some("xls"));
        assert_eq!(extension_for("text/xml"), Some("xml"));
        assert_eq!(extension_for("application/xml"), Some("xml"));
        assert_eq!(extension_for(" text/csv "), Some("csv"));
        assert_eq!(extension_for(""), None);
        assert_eq!(extension_for("application/x-made-up-type"), None);
    }

    #[test]
    fn test_resolve_keeps_valid_name() {
        let d = descriptor("invoice.pdf", "application/pdf");
        assert_eq!(resolve_filename(&d).as_deref(), Some("invoice.pdf"));
    }

    #[test]
    fn test_resolve_generates_name_from_content_type() {
        let d = descriptor("", "image/png; name=\"\"");
        let name = resolve_filename(&d).unwrap();
        assert!(name.starts_with("temp"));
        assert!(name.ends_with(".png"));
        assert!(is_valid_filename(&name));

        let d = descriptor("bad|name.pdf", "application/pdf");
        assert!(resolve_filename(&d).unwrap().ends_with(".pdf"));

        let d = descriptor("", "application/octet-stream");
        assert!(resolve_filename(&d).unwrap().ends_with(".bin"));
    }

    #[test]
    fn test_resolve_gives_up_without_extension() {
        assert!(resolve_filename(&descriptor("", "")).is_none());
        assert!(resolve_filename(&descriptor("a.", "application/x-made-up-type")).is_none());
    }

    #[test]
    fn test_collision_free_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = collision_free_path(dir.path(), "report.pdf");
        assert_eq!(first, dir.path().join("report.pdf"));

        std::fs::write(&first, b"one").unwrap();
        let second = collision_free_path(dir.path(), "report.pdf");
        assert_ne!(second, first);
        let second_name = second.file_name().unwrap().to_str().unwrap();
        assert!(second_name.ends_with("-report.pdf"));
        assert_eq!(second.parent(), Some(dir.path()));
    }
}
