//! Deployment configuration (PRM-007)
//!
//! YAML-backed per-environment configuration: deployment slots, gate
//! bounds for each promotion stage, drift monitor tuning, and the rollback
//! debounce. Loaded once at startup and validated before anything runs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drift::MonitorConfig;
use crate::evaluate::GateConfig;

/// Errors from configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_debounce_n() -> usize {
    3
}

/// Top-level deployment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Deployment slots the controller manages; empty means any slot name
    /// is accepted
    #[serde(default)]
    pub slots: Vec<String>,

    /// Gate applied at Candidate -> Staging
    #[serde(default)]
    pub staging_gate: GateConfig,

    /// Gate applied at Staging -> Production
    #[serde(default)]
    pub production_gate: GateConfig,

    /// Skip human approval on production promotions
    #[serde(default)]
    pub automated_promotion: bool,

    /// Consecutive Critical drift verdicts required before automatic
    /// rollback
    #[serde(default = "default_debounce_n")]
    pub debounce_n: usize,

    /// Drift monitor tuning
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            staging_gate: GateConfig::default(),
            production_gate: GateConfig::default(),
            automated_promotion: false,
            debounce_n: default_debounce_n(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl DeployConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.debounce_n == 0 {
            return Err(ConfigError::Invalid("debounce_n must be at least 1".into()));
        }
        if self.monitor.min_samples == 0 {
            return Err(ConfigError::Invalid("monitor.min_samples must be at least 1".into()));
        }

        let mut seen = std::collections::BTreeSet::new();
        for slot in &self.slots {
            if slot.is_empty() {
                return Err(ConfigError::Invalid("slot names must be non-empty".into()));
            }
            if !seen.insert(slot.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate slot: {slot}")));
            }
        }

        Self::validate_thresholds("monitor.numeric_thresholds", self.monitor.numeric_thresholds)?;
        Self::validate_thresholds(
            "monitor.categorical_thresholds",
            self.monitor.categorical_thresholds,
        )?;
        for (feature, thresholds) in &self.monitor.feature_overrides {
            Self::validate_thresholds(&format!("override for '{feature}'"), *thresholds)?;
        }

        Self::validate_gate("staging_gate", &self.staging_gate)?;
        Self::validate_gate("production_gate", &self.production_gate)?;
        Ok(())
    }

    fn validate_thresholds(
        context: &str,
        thresholds: crate::drift::DriftThresholds,
    ) -> Result<()> {
        if !(thresholds.warning.is_finite() && thresholds.critical.is_finite()) {
            return Err(ConfigError::Invalid(format!("{context}: thresholds must be finite")));
        }
        if thresholds.warning > thresholds.critical {
            return Err(ConfigError::Invalid(format!(
                "{context}: warning {} exceeds critical {}",
                thresholds.warning, thresholds.critical
            )));
        }
        Ok(())
    }

    fn validate_gate(name: &str, gate: &GateConfig) -> Result<()> {
        for (metric, bound) in &gate.bounds {
            if let (Some(min), Some(max)) = (bound.min, bound.max) {
                if min > max {
                    return Err(ConfigError::Invalid(format!(
                        "{name}: metric '{metric}' has min {min} > max {max}"
                    )));
                }
            }
            if bound.min.is_none() && bound.max.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{name}: metric '{metric}' has no bound"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::MetricBound;

    const SAMPLE: &str = r#"
slots:
  - score-predictor
staging_gate:
  bounds:
    accuracy:
      min: 0.90
production_gate:
  bounds:
    accuracy:
      min: 0.90
    rmse:
      max: 5.0
debounce_n: 3
monitor:
  min_samples: 50
  numeric_thresholds:
    warning: 0.10
    critical: 0.25
  categorical_thresholds:
    warning: 0.15
    critical: 0.35
"#;

    #[test]
    fn test_parse_sample() {
        let config = DeployConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.slots, vec!["score-predictor"]);
        assert_eq!(config.debounce_n, 3);
        assert_eq!(
            config.staging_gate.bounds.get("accuracy"),
            Some(&MetricBound::at_least(0.90))
        );
        assert_eq!(config.production_gate.bounds.len(), 2);
        assert!(!config.automated_promotion);
    }

    #[test]
    fn test_defaults() {
        let config = DeployConfig::default();
        assert_eq!(config.debounce_n, 3);
        assert_eq!(config.monitor.min_samples, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_debounce() {
        let result = DeployConfig::from_yaml("debounce_n: 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let yaml = r#"
monitor:
  min_samples: 50
  numeric_thresholds:
    warning: 0.5
    critical: 0.1
  categorical_thresholds:
    warning: 0.15
    critical: 0.35
"#;
        assert!(matches!(DeployConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_duplicate_slots() {
        let yaml = "slots: [a, a]";
        assert!(matches!(DeployConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_bound() {
        let yaml = r#"
staging_gate:
  bounds:
    accuracy:
      min: 0.9
      max: 0.1
"#;
        assert!(matches!(DeployConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_field() {
        assert!(DeployConfig::from_yaml("bogus_field: 1").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = DeployConfig::from_yaml(SAMPLE).unwrap();
        let dumped = serde_yaml::to_string(&config).unwrap();
        let reparsed = DeployConfig::from_yaml(&dumped).unwrap();
        assert_eq!(config, reparsed);
    }
}
