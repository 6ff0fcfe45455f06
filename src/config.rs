//! Configuration types for the chat session client.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Canonical first message shown in a fresh or reset conversation.
pub const DEFAULT_GREETING: &str = "### MISATO just opened her own studio! You can ask her about NFT purchases. Minting fee 0.002eth, total supply 500";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chat / status / heartbeat API settings.
    pub api: ApiConfig,
    /// Liveness check settings.
    pub heartbeat: HeartbeatConfig,
    /// Image-generation status polling settings.
    pub poller: PollerConfig,
    /// Persona presentation settings.
    pub persona: PersonaConfig,
}

/// HTTP API configuration.
///
/// Paths are appended to `base_url`; the generation-status and
/// initial-connection paths get the request / session id as a trailing
/// segment.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the persona backend.
    pub base_url: String,
    /// Bearer credential sent on every authenticated call (empty = none).
    pub bearer_token: String,
    /// Path of the chat endpoint.
    pub chat_path: String,
    /// Path prefix of the generation-status endpoint.
    pub generation_status_path: String,
    /// Path prefix of the admission-check endpoint.
    pub initial_connection_path: String,
    /// Path of the liveness endpoint.
    pub heartbeat_path: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            bearer_token: String::new(),
            chat_path: "/chat".to_owned(),
            generation_status_path: "/generation-status".to_owned(),
            initial_connection_path: "/initial-connection".to_owned(),
            heartbeat_path: "/heartbeat".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("bearer_token", &"<redacted>")
            .field("chat_path", &self.chat_path)
            .field("generation_status_path", &self.generation_status_path)
            .field("initial_connection_path", &self.initial_connection_path)
            .field("heartbeat_path", &self.heartbeat_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Heartbeat monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat ticks in milliseconds.
    pub interval_ms: u64,
    /// A tick is skipped when the user interacted within this window.
    pub activity_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            activity_timeout_ms: 20_000,
        }
    }
}

impl HeartbeatConfig {
    /// Tick interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Activity suppression window as a [`Duration`].
    pub fn activity_timeout(&self) -> Duration {
        Duration::from_millis(self.activity_timeout_ms)
    }
}

/// Image poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay between generation-status polls in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_ms: 2_000 }
    }
}

impl PollerConfig {
    /// Poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Persona presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Display name used by front-ends.
    pub display_name: String,
    /// Greeting the message log is reset to.
    pub greeting: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            display_name: "MISATO".to_owned(),
            greeting: DEFAULT_GREETING.to_owned(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::client_dirs::config_file()
    }

    /// Validates this configuration.
    ///
    /// Checks:
    /// - `api.base_url` parses as an absolute URL
    /// - `api.request_timeout_secs` is greater than 0
    /// - `heartbeat.interval_ms` and `poller.interval_ms` are greater than 0
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url)
            .map_err(|e| ClientError::Config(format!("api.base_url is invalid: {e}")))?;
        if self.api.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "api.request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.heartbeat.interval_ms == 0 {
            return Err(ClientError::Config(
                "heartbeat.interval_ms must be greater than 0".into(),
            ));
        }
        if self.poller.interval_ms == 0 {
            return Err(ClientError::Config(
                "poller.interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
