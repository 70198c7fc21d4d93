//! OAuth2 client secrets as downloaded from the Google Cloud console.
//!
//! The console exports a JSON document with a single top-level `installed`
//! (desktop app) or `web` object:
//!
//! ```json
//! {"installed": {"client_id": "...", "client_secret": "...",
//!                "auth_uri": "...", "token_uri": "...",
//!                "redirect_uris": ["http://localhost"]}}
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{AttachError, Result};

/// Google authorization endpoint used when the secrets file omits `auth_uri`.
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google token endpoint used when the secrets file omits `token_uri`.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Application credentials identifying this client to the OAuth2 server.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Read the secrets file at `path`.
    ///
    /// A missing or malformed file is a configuration error: nothing can be
    /// authorized without it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AttachError::InvalidConfig(format!(
                "cannot read app credentials '{}': {e}",
                path.display()
            ))
        })?;
        let secrets = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), "App secrets read");
        Ok(secrets)
    }

    /// Parse a console secrets document.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(content)
            .map_err(|e| AttachError::InvalidConfig(format!("malformed app credentials: {e}")))?;

        let secrets = file.installed.or(file.web).ok_or_else(|| {
            AttachError::InvalidConfig(
                "app credentials contain neither an 'installed' nor a 'web' client".into(),
            )
        })?;

        if secrets.client_id.trim().is_empty() {
            return Err(AttachError::InvalidConfig(
                "app credentials have an empty client_id".into(),
            ));
        }
        Ok(secrets)
    }
}
