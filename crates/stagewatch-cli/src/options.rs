//! Command-line overrides for poll timing.

use std::path::PathBuf;

use clap::Args;
use stagewatch_core::{PollConfig, Result};

/// Timing options layered over an optional config file.
#[derive(Args, Debug, Clone, Default)]
pub struct PollOptions {
    /// TOML file with poll timing (`sleep_ms`, `max_wait_ms`, ...)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Delay before the first poll, in milliseconds
    #[arg(long = "pre-start-sleep-ms", value_name = "MS")]
    pub pre_start_sleep_ms: Option<u64>,

    /// Interval between polls, in milliseconds
    #[arg(long = "sleep-ms", value_name = "MS")]
    pub sleep_ms: Option<u64>,

    /// Give up after this many milliseconds
    #[arg(long = "max-wait-ms", value_name = "MS")]
    pub max_wait_ms: Option<u64>,
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sleep_ms(mut self, ms: u64) -> Self {
        self.sleep_ms = Some(ms);
        self
    }

    pub fn with_max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait_ms = Some(ms);
        self
    }

    pub fn with_pre_start_sleep_ms(mut self, ms: u64) -> Self {
        self.pre_start_sleep_ms = Some(ms);
        self
    }

    /// Defaults, then the config file, then flags.
    pub fn resolve(&self) -> Result<PollConfig> {
        let mut config = match &self.config {
            Some(path) => PollConfig::from_path(path)?,
            None => PollConfig::default(),
        };
        if let Some(ms) = self.pre_start_sleep_ms {
            config = config.with_pre_start_sleep_ms(ms);
        }
        if let Some(ms) = self.sleep_ms {
            config = config.with_sleep_ms(ms);
        }
        if let Some(ms) = self.max_wait_ms {
            config = config.with_max_wait_ms(ms);
        }
        config.validate()?;
        Ok(config)
    }
}
