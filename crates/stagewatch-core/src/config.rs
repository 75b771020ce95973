//! Poll driver configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagewatch_error::{Error, Result};

/// How the interval between polls grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Sleep before the first poll.
    pub pre_start_sleep_ms: u64,
    /// Base interval between polls.
    pub sleep_ms: u64,
    /// Give up once the next sleep would pass this budget.
    pub max_wait_ms: u64,
    pub backoff_strategy: BackoffStrategy,
    /// Growth factor per attempt for `exponential`.
    pub backoff_multiplier: f64,
    /// Ceiling on a single interval.
    pub max_sleep_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pre_start_sleep_ms: 1000,
            sleep_ms: 2000,
            // Longer than the server-side deadline, so the server usually
            // reports its own failure first.
            max_wait_ms: 660_000,
            backoff_strategy: BackoffStrategy::Fixed,
            backoff_multiplier: 2.0,
            max_sleep_ms: 60_000,
        }
    }
}

impl PollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre_start_sleep_ms(mut self, ms: u64) -> Self {
        self.pre_start_sleep_ms = ms;
        self
    }

    pub fn with_sleep_ms(mut self, ms: u64) -> Self {
        self.sleep_ms = ms;
        self
    }

    pub fn with_max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait_ms = ms;
        self
    }

    pub fn with_backoff(mut self, strategy: BackoffStrategy, multiplier: f64) -> Self {
        self.backoff_strategy = strategy;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_sleep_ms(mut self, ms: u64) -> Self {
        self.max_sleep_ms = ms;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PollConfig = toml::from_str(text).map_err(|e| {
            Error::deserialization_failed(format!("invalid poll config: {}", e.message()))
                .with_operation("config::from_toml_str")
                .set_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::from_path")
                .with_context("path", path.display().to_string())
        })?;
        Self::from_toml_str(&text).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sleep_ms == 0 {
            return Err(Error::config_invalid("sleep_ms must be greater than zero")
                .with_operation("config::validate"));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(Error::config_invalid(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            ))
            .with_operation("config::validate"));
        }
        if self.max_sleep_ms < self.sleep_ms {
            return Err(Error::config_invalid(format!(
                "max_sleep_ms ({}) is below sleep_ms ({})",
                self.max_sleep_ms, self.sleep_ms
            ))
            .with_operation("config::validate"));
        }
        Ok(())
    }

    /// Interval to sleep after the `attempt`-th poll (zero based).
    pub fn interval(&self, attempt: u32) -> Duration {
        let base = self.sleep_ms;
        let ms = match self.backoff_strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let multiplied = base as f64 * self.backoff_multiplier.powi(exponent);
                if multiplied.is_finite() {
                    multiplied as u64
                } else {
                    u64::MAX
                }
            }
        };
        Duration::from_millis(ms.min(self.max_sleep_ms))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn pre_start_sleep(&self) -> Duration {
        Duration::from_millis(self.pre_start_sleep_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stagewatch_error::ErrorKind;

    #[test]
    fn defaults_match_deploy_budget() {
        let config = PollConfig::default();
        assert_eq!(config.max_wait_ms, 660_000);
        assert_eq!(config.interval(0), Duration::from_millis(2000));
        assert_eq!(config.interval(5), Duration::from_millis(2000));
        config.validate().unwrap();
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let config = PollConfig::new()
            .with_sleep_ms(100)
            .with_backoff(BackoffStrategy::Exponential, 2.0)
            .with_max_sleep_ms(500);
        let intervals: Vec<u64> = (0..5).map(|i| config.interval(i).as_millis() as u64).collect();
        assert_eq!(intervals, vec![100, 200, 400, 500, 500]);
        assert_eq!(config.interval(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PollConfig::from_toml_str(
            r#"
            sleep_ms = 250
            backoff_strategy = "exponential"
            "#,
        )
        .unwrap();
        assert_eq!(config.sleep_ms, 250);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.max_wait_ms, 660_000);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        let err = PollConfig::from_toml_str("sleep_millis = 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationFailed);

        let err = PollConfig::from_toml_str("sleep_ms = 0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = PollConfig::from_toml_str("backoff_multiplier = 0.5").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = PollConfig::from_toml_str("sleep_ms = 5000\nmax_sleep_ms = 10").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn from_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PollConfig::from_path(dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.context_value("path").is_some());
    }

    #[test]
    fn from_path_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poll.toml");
        std::fs::write(&path, "max_wait_ms = 1000\npre_start_sleep_ms = 0\n").unwrap();
        let config = PollConfig::from_path(&path).unwrap();
        assert_eq!(config.max_wait(), Duration::from_millis(1000));
        assert_eq!(config.pre_start_sleep(), Duration::ZERO);
    }
}
