//! Engine configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file is
//! a valid configuration.
//!
//! # Example
//!
//! ```toml
//! [pms]
//! max_replicates = 16
//! standard_cv_threshold = "4.0"
//! fluffy_cv_threshold = "6.0"
//! outlier_sigma = "2"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub pms: PmsPolicy,
    pub logging: LogSettings,
}

/// Acceptance rules for thousand-seed-weight replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PmsPolicy {
    /// Hard cap on replicates per analysis, across all batches.
    pub max_replicates: u32,
    /// Maximum coefficient of variation (percent) for ordinary seed.
    pub standard_cv_threshold: Decimal,
    /// Maximum coefficient of variation (percent) for fluffy seed.
    pub fluffy_cv_threshold: Decimal,
    /// Replicates further than this many standard deviations from the mean
    /// are rejected as outliers.
    pub outlier_sigma: Decimal,
}

impl PmsPolicy {
    pub fn cv_threshold(&self, is_fluffy_seed: bool) -> Decimal {
        if is_fluffy_seed {
            self.fluffy_cv_threshold
        } else {
            self.standard_cv_threshold
        }
    }
}

impl Default for PmsPolicy {
    fn default() -> Self {
        Self {
            max_replicates: 16,
            standard_cv_threshold: Decimal::new(40, 1),
            fluffy_cv_threshold: Decimal::new(60, 1),
            outlier_sigma: Decimal::TWO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter directive when no environment filter is set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl LabConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LabConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pms.validate()
    }
}

impl PmsPolicy {
    /// Hard ceiling on `max_replicates`, whatever the configuration says.
    pub const REPLICATE_CEILING: u32 = 16;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=Self::REPLICATE_CEILING).contains(&self.max_replicates) {
            return Err(ConfigError::Invalid(format!(
                "pms.max_replicates must be between 1 and {}, got {}",
                Self::REPLICATE_CEILING,
                self.max_replicates
            )));
        }
        for (name, value) in [
            ("standard_cv_threshold", self.standard_cv_threshold),
            ("fluffy_cv_threshold", self.fluffy_cv_threshold),
            ("outlier_sigma", self.outlier_sigma),
        ] {
            if value <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "pms.{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}
