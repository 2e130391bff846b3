//! Configuration for GCodeForge
//!
//! The configuration is an ordered list of processing stages. Each stage
//! carries its own settings block and an `enabled` flag; stages run in the
//! order they are listed.
//!
//! Files may be JSON or TOML, chosen by extension. In TOML a stage looks
//! like:
//!
//! ```toml
//! [[stages]]
//! stage = "corner_shaping"
//! max_accel_mmss = 3000.0
//! section_types = ["outer wall", "inner wall"]
//! ```

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "gcodeforge";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Corner shaping settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerShapingSettings {
    /// Whether the stage runs
    pub enabled: bool,
    /// Section kinds (lowercased slicer `;TYPE:` names) whose corners are shaped
    pub section_types: Vec<String>,
    /// Machine acceleration limit in mm/s²
    pub max_accel_mmss: f64,
    /// Square corner velocity in mm/s, used to derive the junction deviation
    pub square_corner_velocity_mms: f64,
    /// Explicit junction deviation in mm; overrides the square corner velocity
    pub junction_deviation_mm: Option<f64>,
    /// Sample period of the velocity profile in seconds
    pub dt_s: f64,
    /// Acceleration step of the S-curve ramp in mm/s²
    pub accel_step_mmss: f64,
    /// Duration of the S-curve ramp in seconds
    pub ramp_time_s: f64,
    /// Corners whose speed drop is below this value (mm/s) are left alone
    pub junction_threshold_mms: f64,
    /// Shortest segment the splitter will create, in mm
    pub min_segment_length_mm: f64,
    /// Decimal places used when caching profile solutions
    pub cache_precision: i32,
    /// Number of cached profile solutions
    pub cache_capacity: usize,
}

impl Default for CornerShapingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            section_types: vec!["outer wall".to_string(), "inner wall".to_string()],
            max_accel_mmss: 3000.0,
            square_corner_velocity_mms: 10.0,
            junction_deviation_mm: None,
            dt_s: 0.01,
            accel_step_mmss: 10.0,
            ramp_time_s: 0.2,
            junction_threshold_mms: 1.0,
            min_segment_length_mm: 0.001,
            cache_precision: 0,
            cache_capacity: 1024,
        }
    }
}

impl CornerShapingSettings {
    fn validate(&self) -> ConfigResult<()> {
        positive("corner_shaping.max_accel_mmss", self.max_accel_mmss)?;
        positive(
            "corner_shaping.square_corner_velocity_mms",
            self.square_corner_velocity_mms,
        )?;
        if let Some(deviation) = self.junction_deviation_mm {
            positive("corner_shaping.junction_deviation_mm", deviation)?;
        }
        positive("corner_shaping.dt_s", self.dt_s)?;
        positive("corner_shaping.accel_step_mmss", self.accel_step_mmss)?;
        if !(self.ramp_time_s.is_finite() && self.ramp_time_s >= self.dt_s) {
            return Err(ConfigError::out_of_range(
                "corner_shaping.ramp_time_s",
                self.ramp_time_s,
            ));
        }
        non_negative(
            "corner_shaping.junction_threshold_mms",
            self.junction_threshold_mms,
        )?;
        non_negative(
            "corner_shaping.min_segment_length_mm",
            self.min_segment_length_mm,
        )?;
        if !(-6..=6).contains(&self.cache_precision) {
            return Err(ConfigError::out_of_range(
                "corner_shaping.cache_precision",
                self.cache_precision,
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::out_of_range(
                "corner_shaping.cache_capacity",
                self.cache_capacity,
            ));
        }
        Ok(())
    }
}

/// Pressure advance chosen per section kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureAdvanceByTypeSettings {
    /// Whether the stage runs
    pub enabled: bool,
    /// Value used for section kinds missing from `values`
    pub default_pa: f64,
    /// Pressure advance per section kind
    pub values: BTreeMap<String, f64>,
}

impl Default for PressureAdvanceByTypeSettings {
    fn default() -> Self {
        let shell = 0.37;
        let infill = 0.0;
        let values = [
            ("custom", shell),
            ("skirt", shell),
            ("external perimeter", shell),
            ("perimeter", shell),
            ("internal infill", infill),
            ("solid infill", infill),
            ("top solid infill", infill),
            ("gap fill", shell),
            ("overhang perimeter", shell),
            ("bridge infill", infill),
            ("support material", infill),
            ("support material interface", infill),
            ("wipe tower", infill),
            ("outer wall", shell),
            ("inner wall", shell),
            ("sparse infill", infill),
            ("internal solid infill", infill),
            ("top surface", shell),
            ("bottom surface", shell),
            ("overhang wall", shell),
            ("bridge", infill),
        ]
        .into_iter()
        .map(|(kind, pa)| (kind.to_string(), pa))
        .collect();

        Self {
            enabled: true,
            default_pa: shell,
            values,
        }
    }
}

impl PressureAdvanceByTypeSettings {
    /// Pressure advance for a section kind
    pub fn value_for(&self, kind: &str) -> f64 {
        self.values.get(kind).copied().unwrap_or(self.default_pa)
    }

    fn validate(&self) -> ConfigResult<()> {
        non_negative("pressure_advance_by_type.default_pa", self.default_pa)?;
        for (kind, pa) in &self.values {
            non_negative(&format!("pressure_advance_by_type.values.{}", kind), *pa)?;
        }
        Ok(())
    }
}

/// Pressure advance interpolated from a speed lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLutSettings {
    /// Whether the stage runs
    pub enabled: bool,
    /// Feed rates in mm/s, strictly increasing
    pub speeds_mms: Vec<f64>,
    /// Pressure advance for each entry of `speeds_mms`
    pub pa_values: Vec<f64>,
}

impl Default for SpeedLutSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            speeds_mms: vec![100.0, 150.0, 200.0, 250.0, 300.0],
            pa_values: vec![0.62, 0.48, 0.36, 0.292, 0.28],
        }
    }
}

impl SpeedLutSettings {
    fn validate(&self) -> ConfigResult<()> {
        let key = "speed_lut_pressure_advance";
        if self.speeds_mms.len() != self.pa_values.len() {
            return Err(ConfigError::InvalidTable {
                key: key.to_string(),
                reason: format!(
                    "{} speeds but {} pressure advance values",
                    self.speeds_mms.len(),
                    self.pa_values.len()
                ),
            });
        }
        if self.speeds_mms.len() < 2 {
            return Err(ConfigError::InvalidTable {
                key: key.to_string(),
                reason: "at least two entries are required".to_string(),
            });
        }
        if self.speeds_mms.iter().any(|s| !s.is_finite())
            || self.pa_values.iter().any(|pa| !pa.is_finite())
        {
            return Err(ConfigError::InvalidTable {
                key: key.to_string(),
                reason: "entries must be finite".to_string(),
            });
        }
        if self.speeds_mms.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ConfigError::InvalidTable {
                key: key.to_string(),
                reason: "speeds must be strictly increasing".to_string(),
            });
        }
        Ok(())
    }
}

/// Raw G-code inserted at the start of matching sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionGcodeSettings {
    /// Whether the stage runs
    pub enabled: bool,
    /// G-code text per section kind; may span several lines
    pub snippets: BTreeMap<String, String>,
}

impl Default for SectionGcodeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            snippets: BTreeMap::new(),
        }
    }
}

/// One configured processing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageSettings {
    /// Slow down into and accelerate out of sharp corners
    CornerShaping(CornerShapingSettings),
    /// Set pressure advance per section kind
    PressureAdvanceByType(PressureAdvanceByTypeSettings),
    /// Set pressure advance from a speed lookup table
    SpeedLutPressureAdvance(SpeedLutSettings),
    /// Insert raw G-code per section kind
    SectionGcode(SectionGcodeSettings),
}

impl StageSettings {
    /// Stage identifier as written in config files
    pub fn name(&self) -> &'static str {
        match self {
            Self::CornerShaping(_) => "corner_shaping",
            Self::PressureAdvanceByType(_) => "pressure_advance_by_type",
            Self::SpeedLutPressureAdvance(_) => "speed_lut_pressure_advance",
            Self::SectionGcode(_) => "section_gcode",
        }
    }

    /// Whether the stage is switched on
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::CornerShaping(s) => s.enabled,
            Self::PressureAdvanceByType(s) => s.enabled,
            Self::SpeedLutPressureAdvance(s) => s.enabled,
            Self::SectionGcode(s) => s.enabled,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        match self {
            Self::CornerShaping(s) => s.validate(),
            Self::PressureAdvanceByType(s) => s.validate(),
            Self::SpeedLutPressureAdvance(s) => s.validate(),
            Self::SectionGcode(_) => Ok(()),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filament diameter in mm, used for extruded volume reporting
    pub filament_diameter_mm: f64,
    /// Processing stages in execution order
    pub stages: Vec<StageSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filament_diameter_mm: 1.75,
            stages: vec![
                StageSettings::CornerShaping(CornerShapingSettings::default()),
                StageSettings::PressureAdvanceByType(PressureAdvanceByTypeSettings::default()),
            ],
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        debug!(
            "Loaded config from {} with {} stages",
            path.display(),
            config.stages.len()
        );
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = ConfigFormat::from_path(path)?;

        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).map_err(|e| {
            SettingsError::SaveError(format!("{}: {}", path.display(), e))
        })?;

        debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Render as pretty TOML
    pub fn to_toml_string(&self) -> SettingsResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from `path` if given, else from the default location if a file
    /// exists there, else fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match default_config_path() {
            Some(default) if default.is_file() => Self::load_from_file(&default),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Validate all settings
    pub fn validate(&self) -> ConfigResult<()> {
        positive("filament_diameter_mm", self.filament_diameter_mm)?;
        for stage in &self.stages {
            stage.validate()?;
        }
        Ok(())
    }

    /// Stages that are switched on, in order
    pub fn enabled_stages(&self) -> impl Iterator<Item = &StageSettings> {
        self.stages.iter().filter(|s| s.is_enabled())
    }
}

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Platform config directory for GCodeForge
pub fn config_directory() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| {
            SettingsError::ConfigDirectory("no config or home directory available".to_string())
        })
}

/// Default config file location, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    config_directory()
        .ok()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn positive(key: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(key, value))
    }
}

fn non_negative(key: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[0].name(), "corner_shaping");
    }

    #[test]
    fn test_pa_value_lookup() {
        let settings = PressureAdvanceByTypeSettings::default();
        assert_eq!(settings.value_for("outer wall"), 0.37);
        assert_eq!(settings.value_for("sparse infill"), 0.0);
        assert_eq!(settings.value_for("ironing"), 0.37);
    }

    #[test]
    fn test_invalid_corner_settings() {
        let mut settings = CornerShapingSettings {
            dt_s: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        settings.dt_s = 0.01;
        settings.ramp_time_s = 0.001;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_lut_validation() {
        let mut lut = SpeedLutSettings::default();
        assert!(lut.validate().is_ok());

        lut.pa_values.pop();
        assert!(matches!(lut.validate(), Err(ConfigError::InvalidTable { .. })));

        let unsorted = SpeedLutSettings {
            speeds_mms: vec![100.0, 100.0],
            pa_values: vec![0.1, 0.2],
            ..Default::default()
        };
        assert!(unsorted.validate().is_err());

        let single = SpeedLutSettings {
            speeds_mms: vec![100.0],
            pa_values: vec![0.1],
            ..Default::default()
        };
        assert!(single.validate().is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a.json")),
            Ok(ConfigFormat::Json)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("a.TOML")),
            Ok(ConfigFormat::Toml)
        );
        assert!(ConfigFormat::from_path(Path::new("a.yaml")).is_err());
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
    }

    #[test]
    fn test_stage_tagging_in_toml() {
        let text = r#"
            [[stages]]
            stage = "section_gcode"
            snippets = { "outer wall" = "M204 S500" }

            [[stages]]
            stage = "corner_shaping"
            enabled = false
            max_accel_mmss = 1500.0
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.filament_diameter_mm, 1.75);
        assert_eq!(config.stages.len(), 2);
        match &config.stages[1] {
            StageSettings::CornerShaping(s) => {
                assert!(!s.enabled);
                assert_eq!(s.max_accel_mmss, 1500.0);
                assert_eq!(s.dt_s, 0.01);
            }
            other => panic!("unexpected stage {:?}", other),
        }
        assert_eq!(config.enabled_stages().count(), 1);
    }

    #[test]
    fn test_default_renders_as_toml() {
        let text = Config::default().to_toml_string().unwrap();
        assert!(text.contains("stage = \"corner_shaping\""));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
