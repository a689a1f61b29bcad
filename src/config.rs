//! Core configuration: every threshold in one serde-friendly struct.
//!
//! Defaults match the documented tuning; a TOML file can override any subset
//! of fields for experimentation without rebuilding.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::planner::PlannerConfig;
use crate::recovery::RecoveryConfig;
use crate::softlock::SoftlockConfig;
use crate::spiral::SpiralConfig;

/// Configuration for the volition core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Confidence event window in seconds.
    pub confidence_window_secs: f64,
    /// Goal stack bound; the lowest-priority goal is evicted beyond it.
    pub goal_stack_bound: usize,
    pub softlock: SoftlockConfig,
    pub spiral: SpiralConfig,
    pub planner: PlannerConfig,
    pub recovery: RecoveryConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            confidence_window_secs: 60.0,
            goal_stack_bound: 50,
            softlock: SoftlockConfig::default(),
            spiral: SpiralConfig::default(),
            planner: PlannerConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the detectors cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confidence_window_secs <= 0.0 {
            return Err(ConfigError::Invalid {
                message: "confidence_window_secs must be > 0".into(),
            });
        }
        if self.goal_stack_bound == 0 {
            return Err(ConfigError::Invalid {
                message: "goal_stack_bound must be >= 1".into(),
            });
        }
        if self.spiral.min_samples < 2 {
            return Err(ConfigError::Invalid {
                message: "spiral.min_samples must be >= 2 for a slope fit".into(),
            });
        }
        if self.recovery.max_traversals == 0 {
            return Err(ConfigError::Invalid {
                message: "recovery.max_traversals must be >= 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("volition.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "confidence_window_secs = 30.0\n\n[spiral]\nmoney_loss_per_sample = 100.0\n"
        )
        .unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.confidence_window_secs, 30.0);
        assert_eq!(config.spiral.money_loss_per_sample, 100.0);
        // Untouched fields keep their defaults.
        assert_eq!(config.goal_stack_bound, 50);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "confidence_window_secs = [not toml").unwrap();
        assert!(matches!(
            CoreConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            CoreConfig::load(Path::new("/nonexistent/volition.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = CoreConfig {
            confidence_window_secs: 0.0,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CoreConfig {
            goal_stack_bound: 0,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
