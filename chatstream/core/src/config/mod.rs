//! TOML Configuration File Support
//!
//! Centralized configuration loading for the client, with an optional TOML
//! file at `~/.config/chatstream/client.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8000"
//! stream_path = "/api/chat/stream"
//! analysis_path = "/api/analyze-image"
//!
//! [stream]
//! connect_timeout_ms = 10000
//! idle_timeout_ms = 120000
//! max_history_turns = 0
//! apology_message = "Sorry, I encountered an error. Please try again."
//! update_buffer = 64
//! ```
//!
//! # Environment Variables
//!
//! - `CHATSTREAM_API_URL`: server base URL
//! - `CHATSTREAM_CONNECT_TIMEOUT`: connect timeout in milliseconds
//! - `CHATSTREAM_IDLE_TIMEOUT`: idle read timeout in milliseconds (0 disables)
//! - `CHATSTREAM_MAX_HISTORY`: history turns sent per request (0 = all)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::streaming::APOLOGY_MESSAGE;

/// Default server base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
/// Default streaming chat endpoint path
pub const DEFAULT_STREAM_PATH: &str = "/api/chat/stream";
/// Default document analysis endpoint path
pub const DEFAULT_ANALYSIS_PATH: &str = "/api/analyze-image";
/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Default idle read timeout
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 120_000;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Server base URL
    pub base_url: Option<String>,

    /// Streaming chat endpoint path
    pub stream_path: Option<String>,

    /// Document analysis endpoint path
    pub analysis_path: Option<String>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Idle read timeout in milliseconds (0 disables)
    pub idle_timeout_ms: Option<u64>,

    /// History turns sent per request (0 = all)
    pub max_history_turns: Option<usize>,

    /// Text shown in place of a failed answer
    pub apology_message: Option<String>,

    /// Capacity of the presentation update channel
    pub update_buffer: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server section
    pub server: ServerToml,

    /// Stream section
    pub stream: StreamToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
///
/// Use [`load_config`] to build one with proper priority handling.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server base URL
    pub base_url: String,

    /// Streaming chat endpoint path
    pub stream_path: String,

    /// Document analysis endpoint path
    pub analysis_path: String,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Longest wait for the next stream event (`None` = transport decides)
    pub idle_timeout: Option<Duration>,

    /// History turns sent per request (0 = all)
    pub max_history_turns: usize,

    /// Text shown in place of a failed answer
    pub apology_message: String,

    /// Capacity of the presentation update channel
    pub update_buffer: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Highest-priority source that contributed a value
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            analysis_path: DEFAULT_ANALYSIS_PATH.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            idle_timeout: Some(Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS)),
            max_history_turns: 0,
            apology_message: APOLOGY_MESSAGE.to_string(),
            update_buffer: 64,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would make every request fail
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        if self.update_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "update_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chatstream/client.toml` or
/// `~/.config/chatstream/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chatstream").join("client.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting configuration is invalid. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the resulting configuration is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` to look up environment variables
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = ClientConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    // Server settings
    if let Some(ref url) = toml.server.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(ref path) = toml.server.stream_path {
        config.stream_path.clone_from(path);
    }
    if let Some(ref path) = toml.server.analysis_path {
        config.analysis_path.clone_from(path);
    }

    // Stream settings
    if let Some(ms) = toml.stream.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.stream.idle_timeout_ms {
        config.idle_timeout = idle_timeout_from_ms(ms);
    }
    if let Some(turns) = toml.stream.max_history_turns {
        config.max_history_turns = turns;
    }
    if let Some(ref message) = toml.stream.apology_message {
        config.apology_message.clone_from(message);
    }
    if let Some(buffer) = toml.stream.update_buffer {
        config.update_buffer = buffer;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("CHATSTREAM_API_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("CHATSTREAM_CONNECT_TIMEOUT") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.connect_timeout = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("CHATSTREAM_IDLE_TIMEOUT") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.idle_timeout = idle_timeout_from_ms(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(turns) = env("CHATSTREAM_MAX_HISTORY") {
        if let Ok(n) = turns.parse::<usize>() {
            config.max_history_turns = n;
            config.source = ConfigSource::Env;
        }
    }
}

fn idle_timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,

    /// Idle timeout override (milliseconds, 0 disables)
    pub idle_timeout_ms: Option<u64>,

    /// History bound override
    pub max_history_turns: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Set idle timeout override
    #[must_use]
    pub fn with_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = Some(ms);
        self
    }

    /// Set history bound override
    #[must_use]
    pub fn with_max_history_turns(mut self, turns: usize) -> Self {
        self.max_history_turns = Some(turns);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.connect_timeout_ms.is_none()
            && self.idle_timeout_ms.is_none()
            && self.max_history_turns.is_none()
    }

    /// Apply overrides to a loaded configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override makes the
    /// configuration invalid.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        if let Some(ref url) = self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.idle_timeout_ms {
            config.idle_timeout = idle_timeout_from_ms(ms);
        }
        if let Some(turns) = self.max_history_turns {
            config.max_history_turns = turns;
        }
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}
