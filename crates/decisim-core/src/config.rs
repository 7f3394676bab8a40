//! Engine-wide configuration.
//!
//! Loaded the same way the teacher loads its simulation config: a `serde`-derived struct with
//! `#[serde(default)]` fields throughout, deserialized directly from YAML via `serde_yml`
//! rather than through the `config` crate (see `DESIGN.md` for why the latter was dropped).

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the config file from disk failed.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file's contents were not valid YAML for this schema.
    #[error("failed to parse config YAML: {0}")]
    Yaml(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(err: serde_yml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

/// Tunables for tie-breaking and lookahead defaults, applied whenever a [`crate::policy::LookaheadPolicy`]
/// is constructed without explicit overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Default lookahead horizon for newly constructed policies.
    pub default_horizon: u32,
    /// Default `consistent_tie_breaking` setting.
    pub consistent_tie_breaking: bool,
    /// Default `single_choice` setting.
    pub single_choice: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_horizon: 1,
            consistent_tie_breaking: true,
            single_choice: true,
        }
    }
}

/// Tunables for the probability algebra.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericConfig {
    /// Allowed drift from `1.0` total mass before renormalization is treated as an
    /// [`crate::error::CoreError::InvariantViolation`].
    pub normalization_tolerance: f64,
}

impl Default for NumericConfig {
    fn default() -> Self {
        Self {
            normalization_tolerance: crate::distribution::NORMALIZATION_TOLERANCE,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the injected random source used by `select` sampling and tie-break fallback.
    pub rng_seed: u64,
    /// Default lookahead-policy tunables.
    pub policy: PolicyConfig,
    /// Probability-algebra tunables.
    pub numeric: NumericConfig,
    /// Diagnostic verbosity, `0` (silent) through `5` (per-step subjective-world dump).
    pub explain_level: u8,
}

impl EngineConfig {
    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if `yaml` is not valid YAML for this schema.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a YAML file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or [`ConfigError::Yaml`] if its
    /// contents do not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_normalization_tolerance() {
        let config = EngineConfig::default();
        assert!((config.numeric.normalization_tolerance - 1e-6).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_empty_yaml_uses_all_defaults() {
        let config = EngineConfig::parse("{}").unwrap();
        assert_eq!(config.rng_seed, 0);
        assert!(config.policy.consistent_tie_breaking);
    }

    #[test]
    fn parse_overrides_only_named_fields() {
        let yaml = "rng_seed: 42\npolicy:\n  default_horizon: 3\n";
        let config = EngineConfig::parse(yaml).unwrap();
        assert_eq!(config.rng_seed, 42);
        assert_eq!(config.policy.default_horizon, 3);
        assert!(config.policy.single_choice);
    }

    #[test]
    fn parse_rejects_malformed_yaml() {
        assert!(EngineConfig::parse(":::not yaml:::").is_err());
    }
}
