//! Bridge daemon configuration.
//!
//! Configuration is stored as TOML at `$RELAYCHAT_BRIDGE_CONFIG` if set,
//! otherwise:
//! - Linux: `~/.config/relaychat/bridge.toml`
//! - Windows: `%APPDATA%/relaychat/bridge.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use relaychat_bridge::BridgeConfig;
use relaychat_protocol::constants::{DEFAULT_BACKEND_PORT, DEFAULT_BRIDGE_PORT, MAX_MESSAGE_SIZE};

/// Environment variable overriding the config file location.
const CONFIG_ENV_VAR: &str = "RELAYCHAT_BRIDGE_CONFIG";

/// Bridge daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Interface to accept WebSocket clients on.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Client-facing port (0 = auto-assign).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_backend_host")]
    pub backend_host: String,

    #[serde(default = "default_backend_port")]
    pub backend_port: u16,

    /// Largest frame accepted in either direction, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Seconds between traffic summaries in the log (0 = only on exit).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_listen_host() -> String {
    "0.0.0.0".into()
}

fn default_listen_port() -> u16 {
    DEFAULT_BRIDGE_PORT
}

fn default_backend_host() -> String {
    "127.0.0.1".into()
}

fn default_backend_port() -> u16 {
    DEFAULT_BACKEND_PORT
}

fn default_max_message_size() -> usize {
    MAX_MESSAGE_SIZE
}

fn default_stats_interval() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            backend_host: default_backend_host(),
            backend_port: default_backend_port(),
            max_message_size: default_max_message_size(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn server_config(&self) -> BridgeConfig {
        BridgeConfig {
            listen_host: self.listen_host.clone(),
            listen_port: self.listen_port,
            backend_host: self.backend_host.clone(),
            backend_port: self.backend_port,
            max_message_size: self.max_message_size,
        }
    }
}

/// Returns the configuration file path.
fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("relaychat")
            .join("bridge.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("relaychat").join("bridge.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/relaychat/bridge.toml")
    }
}
