// Runtime configuration: the five options the specification recognises,
// layered defaults → optional file → environment (`RULES_ENGINE_*`) the way
// the teacher layers its own settings with the `config` crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// *T_bg* — background refresh ticker interval, in seconds.
    pub background_interval_secs: u64,
    /// *T_inline* — snapshot age beyond which an inline checksum probe
    /// runs before execution, in seconds.
    pub inline_threshold_secs: u64,
    /// *T_stale* — snapshot age beyond which cache status reports `stale`,
    /// in seconds.
    pub stale_threshold_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            background_interval_secs: 30,
            inline_threshold_secs: 1,
            stale_threshold_secs: 300,
        }
    }
}

impl RefreshConfig {
    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs)
    }

    pub fn inline_threshold(&self) -> Duration {
        Duration::from_secs(self.inline_threshold_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub step_budget: u64,
    pub max_condition_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            step_budget: 10_000,
            max_condition_depth: 32,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub refresh: RefreshConfig,
    pub execution: ExecutionConfig,
}

impl Config {
    /// Load defaults, then an optional config file, then environment
    /// variables prefixed `RULES_ENGINE_` (e.g.
    /// `RULES_ENGINE_REFRESH_BACKGROUND_INTERVAL_SECS=45`).
    pub fn load(file_path: Option<&str>) -> Result<Config> {
        Self::try_load(file_path).map_err(|e| crate::Error::Internal(e.to_string()))
    }

    fn try_load(file_path: Option<&str>) -> std::result::Result<Config, ::config::ConfigError> {
        let defaults = Config::default();
        let mut builder = ::config::Config::builder()
            .set_default("refresh.background_interval_secs", defaults.refresh.background_interval_secs as i64)?
            .set_default("refresh.inline_threshold_secs", defaults.refresh.inline_threshold_secs as i64)?
            .set_default("refresh.stale_threshold_secs", defaults.refresh.stale_threshold_secs as i64)?
            .set_default("execution.step_budget", defaults.execution.step_budget as i64)?
            .set_default("execution.max_condition_depth", defaults.execution.max_condition_depth as i64)?;

        if let Some(path) = file_path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }

        builder = builder.add_source(::config::Environment::with_prefix("RULES_ENGINE").separator("_"));

        builder.build()?.try_deserialize::<Config>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let c = Config::default();
        assert_eq!(c.refresh.background_interval_secs, 30);
        assert_eq!(c.refresh.inline_threshold_secs, 1);
        assert_eq!(c.refresh.stale_threshold_secs, 300);
        assert_eq!(c.execution.step_budget, 10_000);
        assert_eq!(c.execution.max_condition_depth, 32);
    }
}
