//! Engine configuration: YAML file with environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::intercept::InterceptMode;

pub const ENV_SERVICE_TIMEOUT_MS: &str = "BPMN_FLOW_SERVICE_TIMEOUT_MS";
pub const ENV_MAX_STEPS: &str = "BPMN_FLOW_MAX_STEPS";
pub const ENV_INTERCEPT_MODE: &str = "BPMN_FLOW_INTERCEPT_MODE";
pub const ENV_MAX_RECORDINGS: &str = "BPMN_FLOW_MAX_RECORDINGS";

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for one service-task HTTP call.
    pub service_task_timeout_ms: u64,
    /// Node executions allowed per `execute_from_node` call.
    pub max_steps: usize,
    /// Mode for call keys that no policy rule names.
    pub default_intercept_mode: InterceptMode,
    /// Recorded call results kept for replay; the oldest go first.
    pub max_recordings: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_task_timeout_ms: 30_000,
            max_steps: 1_000,
            default_intercept_mode: InterceptMode::Record,
            max_recordings: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn service_task_timeout(&self) -> Duration {
        Duration::from_millis(self.service_task_timeout_ms)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
    }

    /// Optional YAML file, then process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `BPMN_FLOW_*` overrides resolved through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_SERVICE_TIMEOUT_MS) {
            self.service_task_timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SERVICE_TIMEOUT_MS}={raw} is not a number"))?;
        }
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.max_steps = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_STEPS}={raw} is not a number"))?;
        }
        if let Some(raw) = lookup(ENV_INTERCEPT_MODE) {
            self.default_intercept_mode = raw
                .parse::<InterceptMode>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("{ENV_INTERCEPT_MODE}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_MAX_RECORDINGS) {
            self.max_recordings = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_RECORDINGS}={raw} is not a number"))?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.service_task_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_steps, 1000);
        assert_eq!(config.default_intercept_mode, InterceptMode::Record);
        assert_eq!(config.max_recordings, 10_000);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_steps: 25\ndefault_intercept_mode: enabled").unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.default_intercept_mode, InterceptMode::Enabled);
        assert_eq!(config.service_task_timeout_ms, 30_000);
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SERVICE_TIMEOUT_MS, "250"),
            (ENV_INTERCEPT_MODE, "disabled"),
            (ENV_MAX_RECORDINGS, "64"),
        ]);
        let config = EngineConfig::default()
            .with_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.service_task_timeout_ms, 250);
        assert_eq!(config.default_intercept_mode, InterceptMode::Disabled);
        assert_eq!(config.max_recordings, 64);
        assert_eq!(config.max_steps, 1000);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let err = EngineConfig::default()
            .with_overrides(|name| (name == ENV_MAX_STEPS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(format!("{err:#}").contains(ENV_MAX_STEPS));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = EngineConfig::load_from_file(Path::new("/nonexistent/engine.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/engine.yaml"));
    }
}
