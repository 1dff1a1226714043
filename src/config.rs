//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILGRAB_CONFIG` (environment variable)
//! 2. `~/.config/mailgrab/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailgrab\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// IMAP server and mailbox.
    pub imap: ImapConfig,
    /// Microsoft Graph mail API.
    pub graph: GraphConfig,
    /// Where and how results are written.
    pub retrieval: RetrievalConfig,
    /// Throttling backoff bounds for the HTTP API.
    pub retry: RetryConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// IMAP server and mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    /// Folder opened read-only for retrieval.
    pub folder: String,
    /// TOML file holding `user` and `password`.
    pub credentials_file: PathBuf,
}

/// Microsoft Graph mail API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Application (client) ID of the app registration.
    pub client_id: String,
    /// Login authority, e.g. `https://login.microsoftonline.com/common`.
    pub authority: String,
    pub scopes: Vec<String>,
    /// Messages collection endpoint.
    pub base_url: String,
    /// Records requested per page.
    pub page_size: u32,
}

/// Where and how results are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Root directory for per-subject attachment folders.
    pub attachment_dir: PathBuf,
    /// Upper bound on records pulled from the HTTP API.
    pub max_messages: usize,
    /// JSON export path for HTTP API results (none = skip).
    pub json_export: Option<PathBuf>,
    /// What to do when an attachment file already exists.
    pub on_collision: CollisionPolicy,
}

/// Attachment filename collision handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Keep both, appending `_1`, `_2`, … to the new file's stem.
    Number,
}

/// Throttling backoff bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per request before giving up (including the first).
    pub max_attempts: u32,
    /// Wait used when the server sends no `Retry-After`.
    pub default_wait_secs: u64,
    /// Cumulative wait budget for one fetch.
    pub max_total_wait_secs: u64,
}

impl RetryConfig {
    pub fn default_wait(&self) -> Duration {
        Duration::from_secs(self.default_wait_secs)
    }

    pub fn max_total_wait(&self) -> Duration {
        Duration::from_secs(self.max_total_wait_secs)
    }
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            folder: "INBOX".to_string(),
            credentials_file: PathBuf::from("cred.toml"),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            authority: "https://login.microsoftonline.com/common".to_string(),
            scopes: vec!["Mail.Read".to_string()],
            base_url: "https://graph.microsoft.com/v1.0/me/messages".to_string(),
            page_size: 25,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            attachment_dir: PathBuf::from("."),
            max_messages: 50,
            json_export: None,
            on_collision: CollisionPolicy::Overwrite,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            default_wait_secs: 5,
            max_total_wait_secs: 120,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILGRAB_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailgrab").join("config.toml"))
}

/// Return the directory for the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailgrab")
}
