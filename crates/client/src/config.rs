//! Client configuration.
//!
//! Stored as TOML at `$RELAYCHAT_CONFIG` if set, otherwise:
//! - Linux: `~/.config/relaychat/client.toml`
//! - Windows: `%APPDATA%/relaychat/client.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use relaychat_protocol::constants::{
    DEFAULT_BRIDGE_PORT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
    DEFAULT_TYPING_EXPIRY, DEFAULT_TYPING_QUIET, MAX_MESSAGE_SIZE,
};

use crate::store::default_session_path;
use crate::types::ReconnectConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "RELAYCHAT_CONFIG";

/// Errors loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("no configuration directory available")]
    NoConfigDir,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URL of the bridge.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Consecutive failed connection attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Quiet period after the last keystroke before typing stops.
    #[serde(default = "default_typing_quiet_ms")]
    pub typing_quiet_ms: u64,

    /// Lifetime of a remote typing indicator without a refresh.
    #[serde(default = "default_typing_expiry_ms")]
    pub typing_expiry_ms: u64,

    /// Largest attachment accepted for sending. Base64 inflates payloads
    /// by a third, so this stays well under the envelope limit.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,

    /// Session file; the platform default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,
}

fn default_bridge_url() -> String {
    format!("ws://localhost:{DEFAULT_BRIDGE_PORT}")
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY.as_millis() as u64
}

fn default_typing_quiet_ms() -> u64 {
    DEFAULT_TYPING_QUIET.as_millis() as u64
}

fn default_typing_expiry_ms() -> u64 {
    DEFAULT_TYPING_EXPIRY.as_millis() as u64
}

fn default_max_attachment_bytes() -> usize {
    MAX_MESSAGE_SIZE / 4 * 3 - 64 * 1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            typing_quiet_ms: default_typing_quiet_ms(),
            typing_expiry_ms: default_typing_expiry_ms(),
            max_attachment_bytes: default_max_attachment_bytes(),
            session_file: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default location, creating a default
    /// file if none exists.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = ClientConfig::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    pub fn typing_quiet(&self) -> Duration {
        Duration::from_millis(self.typing_quiet_ms)
    }

    pub fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms)
    }

    /// Resolved session file path.
    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_file.clone().or_else(default_session_path)
    }
}

/// Returns the configuration file path.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    config_dir().map(|d| d.join("relaychat").join("client.toml"))
}

/// Returns the platform-specific config directory.
pub(crate) fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
