//! Configuration for addonkeeper.
//!
//! Handles loading and saving `~/.addonkeeper/config.toml`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::providers::ReleaseChannel;

/// Environment variable overriding the CurseForge API key.
pub const CURSEFORGE_KEY_ENV: &str = "ADDONKEEPER_CURSEFORGE_KEY";

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 24;

/// Maximum config file size (1MB).
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// File too large.
    #[error("Config file too large (max {MAX_CONFIG_SIZE} bytes)")]
    FileTooLarge,
}

/// Returns the data directory (~/.addonkeeper/).
#[must_use]
pub fn data_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".addonkeeper")
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub enabled: bool,
    /// Level name; unknown names fall back to `info`.
    pub level: String,
    pub retention_hours: u32,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live addon directory; `None` means not configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addons_dir: Option<PathBuf>,
    /// Registry file; defaults to `~/.addonkeeper/registry.toml`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curseforge_api_key: Option<String>,
    /// Release channel for marketplace installs and checks.
    pub default_channel: ReleaseChannel,
    pub log: LogSection,
}

impl Config {
    /// Returns the default config file path (~/.addonkeeper/config.toml).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        data_directory().join("config.toml")
    }

    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_config_path())
    }

    /// Loads configuration from a specific path.
    ///
    /// A missing file yields defaults. The CurseForge key from the
    /// environment wins over the file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let metadata = fs::metadata(path)?;
            if metadata.len() > MAX_CONFIG_SIZE {
                return Err(ConfigError::FileTooLarge);
            }
            let content = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!("[CONFIG] Loaded {:?}", path);
            config
        } else {
            debug!("[CONFIG] No config at {:?}, using defaults", path);
            Self::default()
        };

        if let Ok(key) = std::env::var(CURSEFORGE_KEY_ENV) {
            if !key.trim().is_empty() {
                config.curseforge_api_key = Some(key);
            }
        }

        Ok(config)
    }

    /// Saves configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_config_path())
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        {
            let mut out = fs::File::create(&temp_path)?;
            out.write_all(content.as_bytes())?;
            out.flush()?;
        }
        fs::rename(&temp_path, path)?;

        info!("[CONFIG] Saved {:?}", path);
        Ok(())
    }

    /// Registry file in use.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| data_directory().join("registry.toml"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.addons_dir, None);
        assert_eq!(config.default_channel, ReleaseChannel::Stable);
        assert!(config.log.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let config = Config {
            addons_dir: Some(PathBuf::from("/games/wow/_retail_/Interface/AddOns")),
            default_channel: ReleaseChannel::Beta,
            log: LogSection {
                level: "debug".to_string(),
                ..LogSection::default()
            },
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.addons_dir, config.addons_dir);
        assert_eq!(loaded.default_channel, ReleaseChannel::Beta);
        assert_eq!(loaded.log, config.log);
    }

    #[test]
    fn test_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "default_channel = \"alpha\"\n[log]\nlevel = \"loud\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.default_channel, ReleaseChannel::Alpha);
        assert_eq!(config.log.retention_hours, DEFAULT_LOG_RETENTION_HOURS);
        assert_eq!(
            crate::logging::level_filter(&config.log),
            tracing::level_filters::LevelFilter::INFO
        );
    }
}
