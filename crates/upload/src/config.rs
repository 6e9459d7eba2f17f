//! Client configuration.
//!
//! Reads/writes JSON at `~/.config/skyvault/config.json` (`%APPDATA%` on
//! Windows). Environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skyvault_transfer::MIB;

use crate::error::UploadError;
use crate::retry::RetryPolicy;

pub const ENV_API_BASE: &str = "SKYVAULT_API_BASE";
pub const ENV_TOKEN: &str = "SKYVAULT_TOKEN";
pub const ENV_CHUNK_SIZE_MB: &str = "SKYVAULT_CHUNK_SIZE_MB";

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8080";
const DEFAULT_CHUNK_SIZE_MB: u64 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Storage client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL the endpoint paths are appended to.
    pub api_base: String,
    /// Bearer token (a JWT carrying `user_id`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Chunk size in MiB. Values below 1 are treated as 1.
    pub chunk_size_mb: u64,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// List the parent folder after completion when the server does not
    /// return the created record.
    pub confirm_materialization: bool,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            token: None,
            chunk_size_mb: DEFAULT_CHUNK_SIZE_MB,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            confirm_materialization: true,
            file_path: None,
        }
    }
}

impl ClientConfig {
    /// Loads the config file and applies environment overrides.
    pub fn load() -> Result<Self, UploadError> {
        let mut config = Self::load_from(&config_file_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from `path`.
    ///
    /// A missing file yields defaults. An unparsable file is logged and
    /// replaced by defaults.
    pub fn load_from(path: &Path) -> Result<Self, UploadError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<ClientConfig>(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse client config, using defaults"
                    );
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.file_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Applies `SKYVAULT_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.token = Some(token.trim().to_string());
        }
        if let Some(raw) = lookup(ENV_CHUNK_SIZE_MB) {
            match raw.trim().parse::<u64>() {
                Ok(mb) => self.chunk_size_mb = mb,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "ignoring invalid SKYVAULT_CHUNK_SIZE_MB"
                ),
            }
        }
    }

    /// Saves configuration to disk with owner-only permissions.
    pub fn save(&self) -> Result<(), UploadError> {
        let path = self.file_path.clone().unwrap_or_else(config_file_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, &json)?;
        set_permissions_0600(&path);

        tracing::debug!(path = %path.display(), "client configuration saved");
        Ok(())
    }

    /// Chunk size in bytes: `max(1, chunk_size_mb)` MiB.
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.max(1) * MIB
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// File this config was loaded from, if any.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

fn config_file_path() -> PathBuf {
    config_base_dir().join("skyvault").join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
