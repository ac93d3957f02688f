//! Configuration management for ragchat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, RagChatError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for ragchat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Document upload settings
    #[serde(default)]
    pub upload: UploadConfig,
    /// Chat settings
    #[serde(default)]
    pub chat: ChatConfig,
    /// Durable session storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base origin of the backend, e.g. `http://localhost:8000`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overall timeout for a single HTTP request (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// How upload progress is reported
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// Progress follows the bytes written to the request body
    #[default]
    Transport,
    /// Degraded mode: a fixed-interval timer advances progress up to a ceiling
    Simulated,
}

impl std::str::FromStr for ProgressMode {
    type Err = RagChatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transport" => Ok(Self::Transport),
            "simulated" => Ok(Self::Simulated),
            other => Err(RagChatError::Config(format!(
                "Invalid progress mode: {}. Must be one of: transport, simulated",
                other
            ))),
        }
    }
}

/// Document upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Progress reporting mode
    #[serde(default)]
    pub progress_mode: ProgressMode,

    /// Tick interval of the simulated progress timer (milliseconds)
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// Delay before progress resets to zero after completion (milliseconds)
    #[serde(default = "default_progress_reset")]
    pub progress_reset_ms: u64,
}

fn default_progress_interval() -> u64 {
    100
}

fn default_progress_reset() -> u64 {
    500
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            progress_mode: ProgressMode::default(),
            progress_interval_ms: default_progress_interval(),
            progress_reset_ms: default_progress_reset(),
        }
    }
}

/// Chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Request streamed answers from the backend
    #[serde(default)]
    pub stream: bool,

    /// Characters of document content shown as a preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_preview_chars() -> usize {
    400
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            stream: false,
            preview_chars: default_preview_chars(),
        }
    }
}

/// Durable storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Explicit path of the session database; platform data dir when unset
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RagChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("RAGCHAT_API_URL") {
            tracing::debug!(base_url = %url, "Env override: RAGCHAT_API_URL");
            self.api.base_url = url;
        }

        if let Ok(timeout) = std::env::var("RAGCHAT_TIMEOUT_SECONDS") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.api.timeout_seconds = v;
                    tracing::debug!(timeout_seconds = v, "Env override: RAGCHAT_TIMEOUT_SECONDS");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for RAGCHAT_TIMEOUT_SECONDS: {}", timeout);
                }
            }
        }

        if let Ok(stream) = std::env::var("RAGCHAT_STREAM") {
            match stream.parse::<bool>() {
                Ok(v) => {
                    self.chat.stream = v;
                    tracing::debug!(stream = v, "Env override: RAGCHAT_STREAM");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for RAGCHAT_STREAM: {}", stream);
                }
            }
        }

        if let Ok(mode) = std::env::var("RAGCHAT_PROGRESS_MODE") {
            match mode.parse::<ProgressMode>() {
                Ok(v) => {
                    self.upload.progress_mode = v;
                    tracing::debug!(progress_mode = ?v, "Env override: RAGCHAT_PROGRESS_MODE");
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }

        if let Ok(path) = std::env::var("RAGCHAT_STORAGE_PATH") {
            self.storage.path = Some(path);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(url) = &cli.api_url {
            self.api.base_url = url.clone();
        }
        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api.base_url).map_err(|e| {
            RagChatError::Config(format!("Invalid api.base_url {}: {}", self.api.base_url, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RagChatError::Config(format!(
                "api.base_url must use http or https, got {}",
                url.scheme()
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(RagChatError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.upload.progress_interval_ms == 0 {
            return Err(RagChatError::Config(
                "upload.progress_interval_ms must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
