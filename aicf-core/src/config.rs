//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/aicf/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/aicf/` (~/.config/aicf/)
//! - Data: `$XDG_DATA_HOME/aicf/` (~/.local/share/aicf/)
//! - State/Logs: `$XDG_STATE_HOME/aicf/` (~/.local/state/aicf/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `$<var>` when set and non-empty, else `~/<fallback>`.
fn xdg_home(var: &str, fallback: &str) -> PathBuf {
    match std::env::var_os(var) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => home_dir().join(fallback),
    }
}

const XDG_DIRS: [(&str, &str); 3] = [
    ("XDG_CONFIG_HOME", ".config"),
    ("XDG_DATA_HOME", ".local/share"),
    ("XDG_STATE_HOME", ".local/state"),
];

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Watcher daemon configuration
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Memory file rendering options
    #[serde(default)]
    pub render: RenderConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Watcher daemon configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Milliseconds to sleep between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Move processed checkpoints and merged chunks under `.archive/`
    /// instead of deleting them
    #[serde(default = "default_archive_processed")]
    pub archive_processed: bool,

    /// Directory polled for checkpoint files (overridable on the CLI)
    pub watch_dir: Option<PathBuf>,

    /// Directory receiving `.aicf/` and `.ai/` artifacts
    pub output_dir: Option<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            archive_processed: default_archive_processed(),
            watch_dir: None,
            output_dir: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_archive_processed() -> bool {
    true
}

/// Rendering options for the memory files
#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    /// Maximum characters of the first user query used in the narrative
    /// heading title. Only the title is shortened; content never is.
    #[serde(default = "default_title_len")]
    pub narrative_title_len: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            narrative_title_len: default_title_len(),
        }
    }
}

fn default_title_len() -> usize {
    60
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with.
    fn validate(&self) -> Result<()> {
        if self.watcher.poll_interval_ms == 0 {
            return Err(Error::Config(
                "watcher.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.render.narrative_title_len == 0 {
            return Err(Error::Config(
                "render.narrative_title_len must be greater than zero".to_string(),
            ));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(Error::Config(format!(
                "logging.level `{}` is not one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/aicf/config.toml` (~/.config/aicf/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_home("XDG_CONFIG_HOME", ".config").join("aicf").join("config.toml")
    }

    /// Returns the data directory path
    ///
    /// `$XDG_DATA_HOME/aicf/` (~/.local/share/aicf/)
    pub fn data_dir() -> PathBuf {
        xdg_home("XDG_DATA_HOME", ".local/share").join("aicf")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/aicf/` (~/.local/state/aicf/)
    pub fn state_dir() -> PathBuf {
        xdg_home("XDG_STATE_HOME", ".local/state").join("aicf")
    }

    /// Returns the diagnostic log file path
    ///
    /// `$XDG_STATE_HOME/aicf/aicf.log` (~/.local/state/aicf/aicf.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("aicf.log")
    }

    /// Default directory polled by the watcher when neither CLI nor config
    /// names one: `$XDG_DATA_HOME/aicf/checkpoints`.
    pub fn default_watch_dir() -> PathBuf {
        Self::data_dir().join("checkpoints")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();
        for (var, fallback) in XDG_DIRS {
            if std::env::var_os(var).is_none() {
                std::env::set_var(var, home.join(fallback));
            }
        }
    }
}
