use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Cross-platform configuration directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the main configuration directory path following platform conventions:
    /// - Linux: $XDG_CONFIG_HOME/drive-sync or ~/.config/drive-sync
    /// - macOS: ~/Library/Application Support/drive-sync
    /// - Windows: %APPDATA%\drive-sync
    pub fn config_dir() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            // Follow XDG Base Directory Specification
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                Ok(PathBuf::from(xdg_config).join("drive-sync"))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join("drive-sync"))
            }
        }

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home
                .join("Library")
                .join("Application Support")
                .join("drive-sync"))
        }

        #[cfg(target_os = "windows")]
        {
            Ok(dirs::config_dir()
                .context("Failed to get Windows config directory")?
                .join("drive-sync"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join(".drive-sync"))
        }
    }

    /// Get the config file path (config.toml)
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the snapshot state file path (state.json)
    pub fn state_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("state.json"))
    }

    /// Get the log file path
    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("drive-sync.log"))
    }

    /// Get the default store root directory
    pub fn default_store_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("store"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
        Ok(config_dir)
    }
}

/// Persisted tool configuration
///
/// Stores the directory under sync, the store root the manifest backend
/// lives in, and the intervals used by the watch and schedule modes. The
/// config is serialized to TOML in the user's configuration directory and
/// survives across command invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Local directory kept in sync with the remote manifest
    pub local_dir: PathBuf,

    /// Root directory of the manifest store backend
    pub store_dir: PathBuf,

    /// Quiet period (seconds) the watcher waits after the last file event
    /// before starting a sync pass
    #[serde(default = "default_watch_debounce_secs")]
    pub watch_debounce_secs: u64,

    /// Interval (seconds) between passes in schedule mode; 0 means the
    /// interval must be given on the command line
    #[serde(default)]
    pub schedule_interval_secs: u64,
}

fn default_watch_debounce_secs() -> u64 {
    300
}

impl DriveConfig {
    pub fn new(local_dir: PathBuf, store_dir: PathBuf) -> Self {
        DriveConfig {
            local_dir,
            store_dir,
            watch_debounce_secs: default_watch_debounce_secs(),
            schedule_interval_secs: 0,
        }
    }

    /// Load the configuration from the config directory
    pub fn load() -> Result<Self> {
        let path = ConfigManager::config_file_path()?;

        if !path.exists() {
            return Err(anyhow!(
                "Not initialized. Run 'drive-sync init <local-dir>' first."
            ));
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: DriveConfig =
            toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save the configuration to the config directory
    pub fn save(&self) -> Result<()> {
        ConfigManager::ensure_config_dir()?;
        let path = ConfigManager::config_file_path()?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Read a configuration value by key, as shown by `config-get`
    pub fn get(&self, key: &str) -> Result<String> {
        match key {
            "local-dir" => Ok(self.local_dir.display().to_string()),
            "store-dir" => Ok(self.store_dir.display().to_string()),
            "watch-debounce-secs" => Ok(self.watch_debounce_secs.to_string()),
            "schedule-interval-secs" => Ok(self.schedule_interval_secs.to_string()),
            _ => bail!("'{key}' is not a valid configuration key"),
        }
    }

    /// Update a configuration value by key, as used by `config-set`
    ///
    /// Interval values must parse as non-negative integers; unknown keys
    /// are rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "local-dir" => {
                self.local_dir = PathBuf::from(value);
            }
            "store-dir" => {
                self.store_dir = PathBuf::from(value);
            }
            "watch-debounce-secs" => {
                self.watch_debounce_secs = parse_seconds(key, value)?;
            }
            "schedule-interval-secs" => {
                self.schedule_interval_secs = parse_seconds(key, value)?;
            }
            _ => bail!("'{key}' is not a valid configuration key"),
        }
        Ok(())
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| anyhow!("'{value}' is not a valid non-negative integer for {key}"))
}
