use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use timeslice_scheduler::SchedulerConfig;

use crate::cli::CliArgs;

/// CLI configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default number of work units per run
    #[serde(default = "default_units")]
    pub units: usize,

    /// Scheduler tuning (quantum budget, resume delay, unit durations)
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_units() -> usize {
    30
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            units: default_units(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl CliConfig {
    /// Return the default config file path: ~/.config/timeslice/config.toml
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("timeslice");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            debug!(?config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!(?config_path, "Loading config");
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config: {}", config_path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to parse config: {}", config_path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the file config.
    pub fn with_overrides(mut self, args: &CliArgs) -> Result<Self> {
        if let Some(units) = args.units {
            self.units = units;
        }
        if let Some(budget) = args.budget_ms {
            self.scheduler.quantum_budget_ms = budget;
        }
        if let Some(delay) = args.resume_delay_ms {
            self.scheduler.resume_delay_ms = delay;
        }
        self.scheduler
            .validate()
            .context("invalid scheduler settings")?;
        Ok(self)
    }
}
