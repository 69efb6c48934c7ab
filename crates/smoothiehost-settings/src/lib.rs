//! SmoothieHost Settings Crate
//!
//! Loads, validates and saves the link configuration.

pub mod config;
pub mod error;
pub mod manager;

pub use config::{load_from_file, save_to_file, validate, ConfigFormat};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
pub use manager::SettingsManager;
