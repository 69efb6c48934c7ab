//! Settings manager
//!
//! Owns the current `LinkConfig` and the file it came from.

use crate::config::{load_from_file, save_to_file};
use crate::error::{SettingsError, SettingsResult};
use smoothiehost_core::LinkConfig;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "smoothiehost";
const CONFIG_FILE: &str = "config.toml";

/// Loads and saves the link configuration
#[derive(Debug, Clone)]
pub struct SettingsManager {
    path: PathBuf,
    config: LinkConfig,
}

impl SettingsManager {
    /// Manager for the file at `path`, starting from defaults
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: LinkConfig::default(),
        }
    }

    /// Manager for the per-user configuration file
    pub fn with_default_path() -> SettingsResult<Self> {
        Ok(Self::new(Self::config_file_path()?))
    }

    /// Per-user configuration directory
    pub fn config_dir() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory".to_string())
            })
    }

    /// Per-user configuration file
    pub fn config_file_path() -> SettingsResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Create the per-user configuration directory if needed
    pub fn ensure_config_dir() -> SettingsResult<PathBuf> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| SettingsError::ConfigDirectory(format!("{}: {}", dir.display(), e)))?;
        Ok(dir)
    }

    /// Load the file, keeping defaults if it does not exist
    pub fn load(&mut self) -> SettingsResult<&LinkConfig> {
        if !self.path.exists() {
            tracing::info!(
                "No settings at {}, using defaults",
                self.path.display()
            );
            self.config = LinkConfig::default();
            return Ok(&self.config);
        }
        self.config = load_from_file(&self.path).map_err(|e| {
            tracing::error!("Failed to load {}: {}", self.path.display(), e);
            SettingsError::LoadError(format!("{}: {}", self.path.display(), e))
        })?;
        tracing::debug!("Loaded settings from {}", self.path.display());
        Ok(&self.config)
    }

    /// Save the current configuration, creating parent directories
    pub fn save(&self) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        save_to_file(&self.config, &self.path)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", self.path.display(), e)))?;
        tracing::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut LinkConfig {
        &mut self.config
    }

    /// Restore default settings
    pub fn restore_defaults(&mut self) {
        self.config = LinkConfig::default();
    }
}
