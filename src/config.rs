//! Configuration management for Portal

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime environment, read from `PORTAL_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Read the environment from `PORTAL_ENV`, defaulting to development
    pub fn from_env() -> Self {
        std::env::var("PORTAL_ENV")
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    /// Parse an environment name; unknown names are development
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    /// Console warnings are suppressed while testing
    pub fn is_test(&self) -> bool {
        matches!(self, Environment::Test)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full or quota exceeded",
            DiskErrorKind::PermissionDenied => "permission denied",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "I/O error",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::StorageFull | ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 (Linux) / 69 (macOS)
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Create a user-friendly error message from an IO error
pub fn friendly_io_error_message(e: &std::io::Error, context: &str) -> String {
    match categorize_io_error(e) {
        DiskErrorKind::Other => format!("{}: {}", context, e),
        kind => format!("{}: {}", context, kind.user_message()),
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub linkedin: LinkedInConfig,

    #[serde(default)]
    pub users: UsersConfig,
}

/// General application metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
        }
    }
}

fn default_title() -> String {
    "Portal".to_string()
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Logging section
///
/// `format` is kept as raw text so that unknown values survive parsing and can be
/// reported by [`crate::logging::log_format`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Access-log format: "combined", "common", "dev", "short" or "tiny"
    #[serde(default)]
    pub format: Option<toml::Value>,

    /// Disk logging; absent means console only
    #[serde(default)]
    pub file_logger: Option<FileLoggerConfig>,
}

/// Disk logging settings
///
/// Every field is optional; [`crate::logging::file_log_options`] fills the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileLoggerConfig {
    #[serde(default)]
    pub directory_path: Option<String>,

    #[serde(default)]
    pub file_name: Option<String>,

    /// Max file size in bytes before rotating
    #[serde(default)]
    pub maxsize: Option<u64>,

    /// Max number of files kept, the live one included
    #[serde(default)]
    pub max_files: Option<usize>,

    /// Write JSON lines instead of plain text
    #[serde(default)]
    pub json: Option<bool>,
}

/// LinkedIn OAuth application credentials and endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkedInConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_linkedin_callback")]
    pub callback_url: String,

    #[serde(default = "default_linkedin_authorization_url")]
    pub authorization_url: String,

    #[serde(default = "default_linkedin_token_url")]
    pub token_url: String,

    #[serde(default = "default_linkedin_profile_url")]
    pub profile_url: String,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: default_linkedin_callback(),
            authorization_url: default_linkedin_authorization_url(),
            token_url: default_linkedin_token_url(),
            profile_url: default_linkedin_profile_url(),
        }
    }
}

impl LinkedInConfig {
    /// Both credentials are present
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

fn default_linkedin_callback() -> String {
    "http://localhost:3000/api/auth/linkedin/callback".to_string()
}

fn default_linkedin_authorization_url() -> String {
    "https://www.linkedin.com/oauth/v2/authorization".to_string()
}

fn default_linkedin_token_url() -> String {
    "https://www.linkedin.com/oauth/v2/accessToken".to_string()
}

fn default_linkedin_profile_url() -> String {
    "https://api.linkedin.com/v1/people/~".to_string()
}

/// User persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersConfig {
    /// JSON file holding user records (default: ~/.portal/users.json)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl UsersConfig {
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| config_dir().join("users.json"))
    }
}

impl Config {
    /// Load configuration from `PORTAL_CONFIG` or the default file, or return defaults if not found
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("PORTAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(config_file_path);
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file, defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Environment variables win over the file for credentials and the listener
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("LINKEDIN_ID") {
            self.linkedin.client_id = id;
        }
        if let Some(secret) = lookup("LINKEDIN_SECRET") {
            self.linkedin.client_secret = secret;
        }
        if let Some(callback) = lookup("LINKEDIN_CALLBACK_URL") {
            self.linkedin.callback_url = callback;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(port = %port, "Ignoring invalid PORT value"),
            }
        }
    }
}

/// Get the base configuration directory (~/.portal)
/// Falls back to ./.portal if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for config");
        PathBuf::from(".portal")
    })
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".portal"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure the base configuration directory exists
pub fn ensure_directories() -> Result<()> {
    std::fs::create_dir_all(config_dir()).context("Failed to create config directory")?;
    Ok(())
}
