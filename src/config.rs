//! Application configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML file at `$ATTACH_CONFIG`, or
//!    `~/.config/attachback/config.toml` (Linux),
//!    `~/Library/Application Support/attachback/config.toml` (macOS),
//!    `%APPDATA%\attachback\config.toml` (Windows)
//! 3. `ATTACH_*` environment variables, including those read from a `.env`
//!    file in the working directory
//! 4. Command-line flags (applied by the binary)
//!
//! The resulting [`Config`] is built once at startup and passed down by
//! reference. Loading happens before logging is set up, so what it saw is
//! kept in a [`LoadReport`] and logged afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AttachError, Result};
use crate::gmail::client::GMAIL_API_BASE;
use crate::records::RECORD_FILENAME;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ATTACH_CONFIG";

pub const ENV_LOG_LEVEL: &str = "ATTACH_LOG_LEVEL";
pub const ENV_DOWNLOAD_PATH: &str = "ATTACH_DOWNLOAD_PATH";
pub const ENV_APP_CREDENTIALS: &str = "ATTACH_APP_CREDENTIALS";
pub const ENV_API_TOKEN: &str = "ATTACH_API_TOKEN";
pub const ENV_GMAIL_SEARCH: &str = "ATTACH_GMAIL_SEARCH";
pub const ENV_CONTENT_TYPE: &str = "ATTACH_CONTENT_TYPE";
pub const ENV_RECORD_PATH: &str = "ATTACH_RECORD_PATH";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Where files come from and go to.
    pub paths: PathsConfig,
    /// Which messages and attachments are downloaded.
    pub filter: FilterConfig,
    /// Remote API settings.
    pub api: ApiConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override directory for the log file.
    pub cache_dir: Option<PathBuf>,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory attachments are written into. Must exist.
    pub download_dir: PathBuf,
    /// Directory holding `records.txt`. Must exist.
    pub record_dir: PathBuf,
    /// OAuth2 client secrets downloaded from the Google Cloud console.
    pub app_credentials: PathBuf,
    /// Where the user's access/refresh token is kept between runs.
    pub api_token: PathBuf,
}

/// Message and attachment selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Gmail search query, e.g. `"has:attachment from:bank"`. Empty = all mail.
    pub query: String,
    /// Substring the attachment content type must contain. Empty = any.
    pub content_type: String,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Gmail API root.
    pub base_url: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./"),
            record_dir: PathBuf::from("./"),
            app_credentials: PathBuf::from("./credentials.json"),
            api_token: PathBuf::from("./token.json"),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: GMAIL_API_BASE.to_string(),
        }
    }
}

// ── Layering ────────────────────────────────────────────────────

impl Config {
    /// Apply `ATTACH_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Vec<(&'static str, String)> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply `ATTACH_*` variables looked up through `lookup`.
    ///
    /// Returns the variables that were set, in the order applied.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<(&'static str, String)> {
        let mut applied = Vec::new();
        let mut var = |name: &'static str| {
            let value = lookup(name);
            if let Some(v) = &value {
                applied.push((name, v.clone()));
            }
            value
        };

        if let Some(v) = var(ENV_LOG_LEVEL) {
            self.general.log_level = v;
        }
        if let Some(v) = var(ENV_DOWNLOAD_PATH) {
            self.paths.download_dir = PathBuf::from(v);
        }
        if let Some(v) = var(ENV_APP_CREDENTIALS) {
            self.paths.app_credentials = PathBuf::from(v);
        }
        if let Some(v) = var(ENV_API_TOKEN) {
            self.paths.api_token = PathBuf::from(v);
        }
        if let Some(v) = var(ENV_GMAIL_SEARCH) {
            self.filter.query = v;
        }
        if let Some(v) = var(ENV_CONTENT_TYPE) {
            self.filter.content_type = v;
        }
        if let Some(v) = var(ENV_RECORD_PATH) {
            self.paths.record_dir = PathBuf::from(v);
        }
        applied
    }

    /// Log the settings in effect, once logging is available.
    pub fn log_effective(&self) {
        tracing::debug!(
            log_level = %self.general.log_level,
            download_dir = %self.paths.download_dir.display(),
            record_dir = %self.paths.record_dir.display(),
            app_credentials = %self.paths.app_credentials.display(),
            api_token = %self.paths.api_token.display(),
            query = %self.filter.query,
            content_type = %self.filter.content_type,
            base_url = %self.api.base_url,
            "Effective configuration"
        );
    }

    /// Check everything that can be checked before touching the network.
    pub fn validate(&self) -> Result<()> {
        require_dir("Download", &self.paths.download_dir)?;
        require_dir("Record", &self.paths.record_dir)?;
        Ok(())
    }

    /// Full path of the dedup log.
    pub fn record_file(&self) -> PathBuf {
        self.paths.record_dir.join(RECORD_FILENAME)
    }
}

fn require_dir(what: &str, dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    tracing::error!(
        dir = %dir.display(),
        "{what} directory does not exist, please create it first"
    );
    Err(AttachError::InvalidConfig(format!(
        "{what} directory does not exist: {}",
        dir.display()
    )))
}

// ── Load / save ─────────────────────────────────────────────────

/// Outcome of one config file lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// No file at the expected location.
    Missing,
    Loaded(PathBuf),
    /// The file exists but could not be read or parsed; defaults were used.
    Rejected { path: PathBuf, error: String },
}

/// What [`load_config`] saw, to be logged once a subscriber is installed.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// `.env` file applied to the process environment, if any.
    pub dotenv: Option<PathBuf>,
    /// A `.env` file that exists but could not be applied.
    pub dotenv_error: Option<String>,
    pub file: FileSource,
    /// `ATTACH_*` variables that overrode file values.
    pub env_vars: Vec<(&'static str, String)>,
}

impl LoadReport {
    /// Emit the events collected while loading.
    pub fn log(&self) {
        match (&self.dotenv, &self.dotenv_error) {
            (Some(path), _) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            (None, Some(e)) => tracing::warn!(error = %e, "Failed to load .env file"),
            (None, None) => tracing::debug!(".env file not found"),
        }

        match &self.file {
            FileSource::Missing => tracing::debug!("No config file, using defaults"),
            FileSource::Loaded(path) => tracing::info!(path = %path.display(), "Loaded config"),
            FileSource::Rejected { path, error } => tracing::warn!(
                path = %path.display(),
                error = %error,
                "Failed to load config, using defaults"
            ),
        }

        for (name, value) in &self.env_vars {
            tracing::debug!(name, value = %value, "Environment variable");
        }
    }
}

/// Load configuration from `.env`, the config file (if any) and the
/// environment.
///
/// A missing or unparsable file yields the defaults.
pub fn load_config() -> (Config, LoadReport) {
    let (dotenv, dotenv_error) = match dotenvy::dotenv() {
        Ok(path) => (Some(path), None),
        Err(e) if e.not_found() => (None, None),
        Err(e) => (None, Some(e.to_string())),
    };

    let (mut config, file) = match config_file_path() {
        Some(path) => load_config_file(&path),
        None => (Config::default(), FileSource::Missing),
    };
    let env_vars = config.apply_env();

    let report = LoadReport {
        dotenv,
        dotenv_error,
        file,
        env_vars,
    };
    (config, report)
}

/// Read and parse one config file.
pub fn load_config_file(path: &Path) -> (Config, FileSource) {
    if !path.exists() {
        return (Config::default(), FileSource::Missing);
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|contents| toml::from_str::<Config>(&contents).map_err(|e| e.to_string()));
    match parsed {
        Ok(cfg) => (cfg, FileSource::Loaded(path.to_path_buf())),
        Err(error) => (
            Config::default(),
            FileSource::Rejected {
                path: path.to_path_buf(),
                error,
            },
        ),
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("attachback").join("config.toml"))
}

/// Return the directory for the log file.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attachback")
}
