//! Tracker configuration: sensor raster, rig calibration, tracking parameters
//! and logging, loadable from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core_modules::coordinate::{PlayerCount, Resolution};
use crate::core_modules::depth_estimator::Calibration;
use crate::core_modules::frame_tabulator::{DEFAULT_DIVISION_WIDTH_BITS, required_division_bits};
use crate::error::ConfigError;
use crate::telemetry::LogConfig;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Active raster of each sensor
    pub sensor: Resolution,
    /// Stereo rig calibration constants
    pub calibration: Calibration,
    /// Clustering and tabulation parameters
    pub tracking: TrackingParams,
    /// Logging setup
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParams {
    /// Players tracked at start-up. Can be changed per frame.
    pub players: PlayerCount,
    /// Operand width of each sensor's division unit.
    pub division_width_bits: u32,
    /// Frames with at least this many samples are split across CPU cores.
    pub partition_threshold: usize,
    /// Upper limit on accumulation partitions; 0 means one per CPU.
    pub max_partitions: usize,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            players: PlayerCount::MAX,
            division_width_bits: DEFAULT_DIVISION_WIDTH_BITS,
            partition_threshold: 16_384,
            max_partitions: 0,
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor.width == 0 || self.sensor.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "sensor resolution must be non-zero, got {}x{}",
                self.sensor.width, self.sensor.height
            )));
        }

        let cal = &self.calibration;
        let constants = [
            ("resolution_width", cal.resolution_width),
            ("sensor_width", cal.sensor_width),
            ("focal_length", cal.focal_length),
            ("baseline_distance", cal.baseline_distance),
        ];
        for (name, value) in constants {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("calibration.{name} must be positive, got {value}")));
            }
        }

        let needed_bits = required_division_bits(self.sensor);
        let width = self.tracking.division_width_bits;
        if width == 0 || width > 64 || width < needed_bits {
            return Err(ConfigError::Invalid(format!(
                "tracking.division_width_bits must be within {needed_bits}..=64 for a {}x{} sensor, got {width}",
                self.sensor.width, self.sensor.height
            )));
        }

        Ok(())
    }
}

/// Loads `TrackerConfig` files.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TrackerConfig, ConfigError> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => {
                let text = std::fs::read_to_string(path)?;
                TrackerConfig::from_toml_str(&text)
            }
            _ => Err(ConfigError::Invalid(format!("unsupported config format: {extension:?}"))),
        }
    }

    pub fn save<P: AsRef<Path>>(config: &TrackerConfig, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, config.to_toml_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrackerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sensor, Resolution::new(1280, 720));
        assert_eq!(config.tracking.players.get(), 4);
        assert_eq!(config.calibration.baseline_distance, 6.0);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = TrackerConfig::from_toml_str(
            r#"
            [tracking]
            players = 2

            [calibration]
            resolution_width = 1280.0
            sensor_width = 0.334646
            focal_length = 0.1295276
            baseline_distance = 12.0
            "#,
        )
        .unwrap();
        assert_eq!(config.tracking.players.get(), 2);
        assert_eq!(config.calibration.baseline_distance, 12.0);
        assert_eq!(config.sensor, Resolution::new(1280, 720));
        assert_eq!(config.tracking.division_width_bits, 32);
    }

    #[test]
    fn out_of_range_player_count_is_rejected() {
        let err = TrackerConfig::from_toml_str("[tracking]\nplayers = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn narrow_divider_is_rejected() {
        let err = TrackerConfig::from_toml_str("[tracking]\ndivision_width_bits = 16\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn negative_calibration_is_rejected() {
        let mut config = TrackerConfig::default();
        config.calibration.focal_length = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn round_trips_through_a_file() {
        let path = std::env::temp_dir().join("stereo_tracker_config_test.toml");
        let mut config = TrackerConfig::default();
        config.tracking.partition_threshold = 1024;
        ConfigLoader::save(&config, &path).unwrap();
        let loaded = ConfigLoader::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(path);
    }
}
