//! GCodeForge Settings Crate
//!
//! Loads, validates and saves the processing pipeline configuration.

pub mod config;
pub mod error;

pub use config::{
    config_directory, default_config_path, Config, ConfigFormat, CornerShapingSettings,
    PressureAdvanceByTypeSettings, SectionGcodeSettings, SpeedLutSettings, StageSettings,
    APP_DIR_NAME, CONFIG_FILE_NAME,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
