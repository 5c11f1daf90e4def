//! Relay configuration management.
//!
//! Configuration is stored as TOML at `$FILEDROP_CONFIG` if set, otherwise:
//! - Linux: `~/.config/filedrop/relay.toml`
//! - Windows: `%APPDATA%/filedrop/relay.toml`
//!
//! The `PORT` environment variable overrides the configured port.

use std::path::{Path, PathBuf};
use std::time::Duration;

use filedrop_protocol::constants::{DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_FILE_SIZE};
use filedrop_transfer::EngineConfig;
use serde::{Deserialize, Serialize};

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket server port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory completed uploads are written to.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Accepted content types. An empty list accepts every type.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,

    /// Seconds without a chunk before an upload is expired (0 = never).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Seconds between idle sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_port() -> u16 {
    3001
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_allowed_types() -> Vec<String> {
    DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect()
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            uploads_dir: default_uploads_dir(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_from(&config_path())?;
        Ok(config.with_port_override(std::env::var("PORT").ok().as_deref()))
    }

    /// Loads `path`, writing the defaults there first if it is missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies a `PORT` value. Unparseable values are ignored.
    pub fn with_port_override(mut self, raw: Option<&str>) -> Self {
        if let Some(raw) = raw {
            match raw.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(value = raw, "ignoring invalid PORT"),
            }
        }
        self
    }

    /// Limits for the transfer engine.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_file_size: self.max_file_size,
            allowed_types: self.allowed_types.clone(),
        }
    }

    /// Idle timeout and sweep period, or `None` if sweeping is disabled.
    pub fn idle_sweep(&self) -> Option<(Duration, Duration)> {
        if self.idle_timeout_secs == 0 || self.sweep_interval_secs == 0 {
            return None;
        }
        Some((
            Duration::from_secs(self.idle_timeout_secs),
            Duration::from_secs(self.sweep_interval_secs),
        ))
    }
}

/// Returns the configuration file path.
fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("FILEDROP_CONFIG") {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("filedrop").join("relay.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("filedrop")
            .join("relay.toml")
    }
}
