//! Settings errors

use std::io;
use thiserror::Error;

/// Failure to load or save link settings
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Loading failed; the message names the file
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// Saving failed; the message names the file
    #[error("Failed to save settings: {0}")]
    SaveError(String),

    /// No per-user configuration directory
    #[error("Config directory error: {0}")]
    ConfigDirectory(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlWriteError(#[from] toml::ser::Error),

    /// Values the link cannot work with
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Rejected configuration value or format
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Extension other than `.json` or `.toml`
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    #[error("Missing configuration value: {0}")]
    MissingValue(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::LoadError("file not found".to_string());
        assert_eq!(err.to_string(), "Failed to load settings: file not found");

        let err = SettingsError::ConfigDirectory("permission denied".to_string());
        assert_eq!(err.to_string(), "Config directory error: permission denied");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnsupportedFormat("yaml".to_string());
        assert_eq!(err.to_string(), "Unsupported config format: yaml");

        let err = ConfigError::ValueOutOfRange {
            key: "connection.baud_rate".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Value out of range for 'connection.baud_rate': 0"
        );
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::MissingValue("polling.status_query".to_string());
        let settings_err: SettingsError = config_err.into();
        assert!(matches!(settings_err, SettingsError::Config(_)));

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let settings_err: SettingsError = io_err.into();
        assert!(matches!(settings_err, SettingsError::IoError(_)));
    }
}
