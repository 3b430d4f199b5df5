// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration.
//!
//! Settings are stored as RON and carry a format version; files written by a
//! newer engine are rejected on load.

use crate::error::ConfigError;
use kinetic_drivers::Arbitration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current config format version
pub const CONFIG_FORMAT_VERSION: u32 = 1;

/// Default engine config file name
pub const CONFIG_FILE_NAME: &str = "kinetic.ron";

/// Runtime tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Config format version
    pub version: u32,
    /// Delta reported on the first tick after the loop (re)starts
    pub default_frame_interval_ms: f64,
    /// Upper bound on the delta reported for one tick
    pub max_frame_delta_ms: f64,
    /// Which write is kept when several drivers target one node in a tick
    pub driver_arbitration: Arbitration,
    /// Log when arbitration discards a write
    pub warn_on_driver_conflict: bool,
    /// Commands applied per tick, `None` for unbounded
    pub max_commands_per_frame: Option<usize>,
    /// Treat `onScroll` and `topScroll` as one event name
    pub normalize_event_names: bool,
    /// Propagation re-runs per tick caused by expression writes
    pub max_settle_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_FORMAT_VERSION,
            default_frame_interval_ms: 1000.0 / 60.0,
            max_frame_delta_ms: 100.0,
            driver_arbitration: Arbitration::default(),
            warn_on_driver_conflict: true,
            max_commands_per_frame: Some(4096),
            normalize_event_names: true,
            max_settle_passes: 4,
        }
    }
}

impl EngineConfig {
    /// Parse a config from RON text
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&content)?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Save to a config file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version > CONFIG_FORMAT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: CONFIG_FORMAT_VERSION,
            });
        }
        for (name, value) in [
            ("default_frame_interval_ms", self.default_frame_interval_ms),
            ("max_frame_delta_ms", self.max_frame_delta_ms),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.max_settle_passes == 0 {
            return Err(ConfigError::Invalid(
                "max_settle_passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ron_round_trip() {
        let config = EngineConfig {
            driver_arbitration: Arbitration::FirstWriteWins,
            max_commands_per_frame: None,
            ..EngineConfig::default()
        };
        let text = config.to_ron().unwrap();
        assert_eq!(EngineConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = EngineConfig::from_ron("(max_settle_passes: 2)").unwrap();
        assert_eq!(config.max_settle_passes, 2);
        assert_eq!(config.max_frame_delta_ms, 100.0);
        assert!(config.normalize_event_names);
    }

    #[test]
    fn test_newer_version_rejected() {
        let err = EngineConfig::from_ron("(version: 99)").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedVersion { found: 99, supported: CONFIG_FORMAT_VERSION }
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(matches!(
            EngineConfig::from_ron("(max_frame_delta_ms: 0.0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_ron("(max_settle_passes: 0)"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("kinetic-config-{}.ron", std::process::id()));
        let config = EngineConfig {
            warn_on_driver_conflict: false,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
