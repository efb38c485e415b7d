use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::EngineError;

/// Wildcard policy key.
pub const WILDCARD: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptMode {
    /// Call through; nothing stored, nothing logged.
    Disabled,
    /// Never call through; answer from recordings or synthesize.
    Enabled,
    /// Call through, store the result for replay and log the call.
    #[default]
    Record,
}

impl InterceptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterceptMode::Disabled => "disabled",
            InterceptMode::Enabled => "enabled",
            InterceptMode::Record => "record",
        }
    }
}

impl std::fmt::Display for InterceptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterceptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(InterceptMode::Disabled),
            "enabled" => Ok(InterceptMode::Enabled),
            "record" => Ok(InterceptMode::Record),
            other => Err(format!("unknown intercept mode '{other}'")),
        }
    }
}

/// The four effectful operations the engine performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    UpdateInstance,
    CreateExecution,
    UpdateExecution,
    ExecuteNode,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::UpdateInstance => "UpdateInstance",
            Operation::CreateExecution => "CreateExecution",
            Operation::UpdateExecution => "UpdateExecution",
            Operation::ExecuteNode => "ExecuteNode",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"<Operation>:<v1>:<v2>…"` from the parameters whose name contains `id`
/// (case-insensitive), in declaration order. List values are joined by `,`.
pub fn call_key(op: Operation, params: &[(&str, Value)]) -> String {
    let mut key = op.as_str().to_string();
    for (name, value) in params {
        if name.to_ascii_lowercase().contains("id") {
            key.push(':');
            key.push_str(&key_part(value));
        }
    }
    key
}

fn key_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(key_part).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Mode per call key: exact key, then the bare operation name
/// (`"UpdateInstance"`), then `"*"`, then the default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptPolicy {
    #[serde(default)]
    rules: BTreeMap<String, InterceptMode>,
    #[serde(default)]
    default_mode: InterceptMode,
}

impl InterceptPolicy {
    pub fn new(default_mode: InterceptMode) -> Self {
        Self {
            rules: BTreeMap::new(),
            default_mode,
        }
    }

    /// Every call mocked: `{"*": "enabled"}`.
    pub fn mock_all() -> Self {
        Self::new(InterceptMode::Record).with_rule(WILDCARD, InterceptMode::Enabled)
    }

    pub fn with_rule(mut self, key: impl Into<String>, mode: InterceptMode) -> Self {
        self.rules.insert(key.into(), mode);
        self
    }

    /// Overlay another policy's rules on top of this one.
    pub fn merge(mut self, other: &InterceptPolicy) -> Self {
        self.rules
            .extend(other.rules.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }

    /// Parse the `x-intercept-policy` header: a JSON object of key → mode.
    pub fn from_header(raw: &str, default_mode: InterceptMode) -> Result<Self, EngineError> {
        let rules: BTreeMap<String, InterceptMode> =
            serde_json::from_str(raw).map_err(|e| EngineError::InvalidRequest {
                message: format!("invalid intercept policy: {e}"),
            })?;
        Ok(Self {
            rules,
            default_mode,
        })
    }

    pub fn mode_for(&self, key: &str) -> InterceptMode {
        let operation = key.split(':').next().unwrap_or(key);
        self.rules
            .get(key)
            .or_else(|| self.rules.get(operation))
            .or_else(|| self.rules.get(WILDCARD))
            .copied()
            .unwrap_or(self.default_mode)
    }

    pub fn default_mode(&self) -> InterceptMode {
        self.default_mode
    }
}
