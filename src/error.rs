//! Centralized error types for attachback.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the attachback library.
#[derive(Error, Debug)]
pub enum AttachError {
    /// The user denied access or the authorization exchange failed.
    #[error("Authorization failed: {0}")]
    AuthGrant(String),

    /// A stored credential expired and could not be refreshed.
    #[error("Could not refresh stored credentials: {0}")]
    AuthRefresh(String),

    /// A Gmail API call (listing, message detail or attachment) failed.
    #[error("Gmail API error {code}: {message}")]
    RemoteFetch { code: u16, message: String },

    /// Missing or invalid configuration, detected before any remote call.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No usable filename or extension could be derived for an attachment.
    #[error("Cannot name attachment in message {message_id} (content type '{content_type}')")]
    UnresolvableFilename {
        message_id: String,
        content_type: String,
    },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON from the API or on disk.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Attachment payload was not valid base64url.
    #[error("Could not decode attachment data: {0}")]
    Decode(String),
}

/// Convenience alias for `Result<T, AttachError>`.
pub type Result<T> = std::result::Result<T, AttachError>;

impl AttachError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `RemoteFetch` variant.
    pub fn remote(code: u16, message: impl Into<String>) -> Self {
        Self::RemoteFetch {
            code,
            message: message.into(),
        }
    }

    /// Errors that must abort the whole run rather than skip one item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthGrant(_) | Self::AuthRefresh(_) | Self::InvalidConfig(_)
        )
    }
}
