//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::CorrelationError;
use crate::estimator::MIN_SAMPLES;

/// Default significance level for `is_significant`
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Tunable engine settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Habits with fewer paired observations are left out of the result set.
    /// Never below [`MIN_SAMPLES`].
    pub min_samples: usize,
    /// A result is flagged significant when its p-value is below this level
    pub significance_level: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), CorrelationError> {
        if self.min_samples < MIN_SAMPLES {
            return Err(CorrelationError::InvalidConfig(format!(
                "min_samples must be at least {MIN_SAMPLES}, got {}",
                self.min_samples
            )));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(CorrelationError::InvalidConfig(format!(
                "significance_level must be in (0, 1), got {}",
                self.significance_level
            )));
        }
        Ok(())
    }

    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, CorrelationError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
