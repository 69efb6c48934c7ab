//! Link configuration files
//!
//! `LinkConfig` is stored as JSON or TOML, picked by file extension.
//! Every section is optional in the file; missing values take their
//! defaults. Values are validated on load and before save.

use crate::error::{ConfigError, ConfigResult, SettingsResult};
use smoothiehost_core::LinkConfig;
use std::path::Path;

/// On-disk format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Parse configuration text
    pub fn parse(self, content: &str) -> SettingsResult<LinkConfig> {
        Ok(match self {
            Self::Json => serde_json::from_str(content)?,
            Self::Toml => toml::from_str(content)?,
        })
    }

    /// Render configuration text
    pub fn render(self, config: &LinkConfig) -> SettingsResult<String> {
        Ok(match self {
            Self::Json => serde_json::to_string_pretty(config)?,
            Self::Toml => toml::to_string_pretty(config)?,
        })
    }
}

/// Load and validate a configuration file
pub fn load_from_file(path: &Path) -> SettingsResult<LinkConfig> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    let config = format.parse(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Validate and save a configuration file
pub fn save_to_file(config: &LinkConfig, path: &Path) -> SettingsResult<()> {
    validate(config)?;
    let format = ConfigFormat::from_path(path)?;
    std::fs::write(path, format.render(config)?)?;
    Ok(())
}

fn out_of_range(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Check values the link cannot work with
pub fn validate(config: &LinkConfig) -> ConfigResult<()> {
    let connection = &config.connection;
    if connection.baud_rate == 0 {
        return Err(out_of_range("connection.baud_rate", connection.baud_rate));
    }
    if connection.net_port == 0 {
        return Err(out_of_range("connection.net_port", connection.net_port));
    }
    if connection.open_timeout_ms == 0 {
        return Err(out_of_range(
            "connection.open_timeout_ms",
            connection.open_timeout_ms,
        ));
    }

    if config.polling.status_query.is_empty() {
        return Err(ConfigError::MissingValue(
            "polling.status_query".to_string(),
        ));
    }
    if config.polling.queries.iter().any(|q| q.trim().is_empty()) {
        return Err(ConfigError::MissingValue("polling.queries".to_string()));
    }

    if config.queue.normal_capacity == 0 {
        return Err(out_of_range(
            "queue.normal_capacity",
            config.queue.normal_capacity,
        ));
    }
    if config.streaming.progress_every == 0 {
        return Err(out_of_range(
            "streaming.progress_every",
            config.streaming.progress_every,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettingsError;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/config.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.JSON")).unwrap(),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.yaml")),
            Err(ConfigError::UnsupportedFormat("yaml".to_string()))
        );
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&LinkConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = LinkConfig::default();
        config.connection.baud_rate = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValueOutOfRange { key, .. }) if key == "connection.baud_rate"
        ));

        let mut config = LinkConfig::default();
        config.queue.normal_capacity = 0;
        assert!(validate(&config).is_err());

        let mut config = LinkConfig::default();
        config.polling.status_query.clear();
        assert_eq!(
            validate(&config),
            Err(ConfigError::MissingValue("polling.status_query".to_string()))
        );
    }

    #[test]
    fn test_polling_disabled_is_valid() {
        let mut config = LinkConfig::default();
        config.polling.interval_ms = 0;
        config.polling.queries.clear();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = TempDir::new().unwrap();
        let mut config = LinkConfig::default();
        config.connection.baud_rate = 250000;
        config.streaming.fast_stream = true;
        config.polling.queries = vec!["M105\n".to_string(), "M114\n".to_string()];

        for name in ["link.toml", "link.json"] {
            let path = dir.path().join(name);
            save_to_file(&config, &path).unwrap();
            assert_eq!(load_from_file(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[streaming]\nwait_on_m0 = true\n").unwrap();

        let config = load_from_file(&path).unwrap();
        assert!(config.streaming.wait_on_m0);
        assert_eq!(config.connection, LinkConfig::default().connection);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[queue]\nnormal_capacity = 0\n").unwrap();
        assert!(matches!(
            load_from_file(&path),
            Err(SettingsError::Config(_))
        ));

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(
            load_from_file(&path),
            Err(SettingsError::TomlError(_))
        ));
    }
}
