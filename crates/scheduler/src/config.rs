use std::path::Path;

use crate::error::SchedulerError;
use crate::types::SchedulerConfig;

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Validate the config: budget, frame fit, and unit duration range.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.validate_budget()?;
        self.validate_unit_range()?;
        Ok(())
    }

    fn validate_budget(&self) -> Result<(), SchedulerError> {
        if self.quantum_budget_ms == 0 {
            return Err(SchedulerError::Config(
                "quantum_budget_ms must be greater than zero".into(),
            ));
        }
        if self.frame_interval_ms < self.quantum_budget_ms {
            return Err(SchedulerError::Config(format!(
                "quantum budget {}ms does not fit in frame interval {}ms",
                self.quantum_budget_ms, self.frame_interval_ms
            )));
        }
        Ok(())
    }

    fn validate_unit_range(&self) -> Result<(), SchedulerError> {
        if self.min_unit_ms == 0 {
            return Err(SchedulerError::Config(
                "min_unit_ms must be at least 1".into(),
            ));
        }
        if self.min_unit_ms > self.max_unit_ms {
            return Err(SchedulerError::Config(format!(
                "min_unit_ms ({}) exceeds max_unit_ms ({})",
                self.min_unit_ms, self.max_unit_ms
            )));
        }
        Ok(())
    }
}
