//! Runtime configuration.

use canopy_workflow::RestorePolicy;
use serde::{Deserialize, Serialize};

use crate::RuntimeError;

/// What the runtime does with the root workflow's outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
  /// The first output ends the session and becomes its outcome.
  #[default]
  Terminal,
  /// Outputs are forwarded to the session and the tree keeps running.
  Continuous,
}

/// Configuration for a [`WorkflowRuntime`](crate::WorkflowRuntime).
///
/// Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
  pub output_mode: OutputMode,
  /// Applied to every node restored from a snapshot.
  pub restore_policy: RestorePolicy,
}

impl RuntimeConfig {
  pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
    serde_json::from_str(json).map_err(|e| RuntimeError::Config {
      message: e.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_config_uses_defaults() {
    let config = RuntimeConfig::from_json("{}").unwrap();
    assert_eq!(config, RuntimeConfig::default());
    assert_eq!(config.output_mode, OutputMode::Terminal);
    assert_eq!(config.restore_policy, RestorePolicy::Fail);
  }

  #[test]
  fn fields_use_snake_case() {
    let config =
      RuntimeConfig::from_json(r#"{"output_mode": "continuous", "restore_policy": "initial_state"}"#)
        .unwrap();
    assert_eq!(config.output_mode, OutputMode::Continuous);
    assert_eq!(config.restore_policy, RestorePolicy::InitialState);
  }

  #[test]
  fn unknown_modes_are_config_errors() {
    let err = RuntimeConfig::from_json(r#"{"output_mode": "sometimes"}"#).unwrap_err();
    assert!(matches!(err, RuntimeError::Config { .. }));
  }
}
