//! The action graph describing how to run a workload.
//!
//! Actions are encoded as `{"action": "<kind>", "args": {...}}`. Composite
//! kinds (`timeout`, `try`, `emit_progress`, `parallel`, `serial`) nest other
//! actions and are validated recursively.

use serde::{Deserialize, Serialize};

use crate::{require, ModelError};

/// A single node of an action graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "args", rename_all = "snake_case")]
pub enum Action {
    Download(DownloadAction),
    Upload(UploadAction),
    Run(RunAction),
    EmitProgress(EmitProgressAction),
    Timeout(TimeoutAction),
    Try(TryAction),
    Parallel(ParallelAction),
    Serial(SerialAction),
}

impl Action {
    /// Validate this action and everything nested under it.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            Action::Download(a) => {
                require("from", &a.from)?;
                require("to", &a.to)
            }
            Action::Upload(a) => {
                require("from", &a.from)?;
                require("to", &a.to)
            }
            Action::Run(a) => require("path", &a.path),
            Action::EmitProgress(a) => a.action.validate(),
            Action::Timeout(a) => {
                if a.timeout_ms == 0 {
                    return Err(ModelError::invalid_field("timeout_ms"));
                }
                a.action.validate()
            }
            Action::Try(a) => a.action.validate(),
            Action::Parallel(ParallelAction { actions })
            | Action::Serial(SerialAction { actions }) => {
                if actions.is_empty() {
                    return Err(ModelError::invalid_field("actions"));
                }
                actions.iter().try_for_each(Action::validate)
            }
        }
    }

    /// Short name of the action kind, as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Download(_) => "download",
            Action::Upload(_) => "upload",
            Action::Run(_) => "run",
            Action::EmitProgress(_) => "emit_progress",
            Action::Timeout(_) => "timeout",
            Action::Try(_) => "try",
            Action::Parallel(_) => "parallel",
            Action::Serial(_) => "serial",
        }
    }
}

/// Fetch an artifact into the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAction {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache_key: String,
}

/// Copy a file out of the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAction {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// Run a process inside the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAction {
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvironmentVariable>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
}

/// Wrap an action with progress messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitProgressAction {
    pub action: Box<Action>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub success_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_message: String,
}

/// Fail the wrapped action if it runs longer than `timeout_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutAction {
    pub action: Box<Action>,
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Run the wrapped action, ignoring its failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryAction {
    pub action: Box<Action>,
}

/// Run all actions concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelAction {
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Run all actions in order, stopping at the first failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialAction {
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A name/value pair exported to a process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}
