//! One-off task records.

use serde::{Deserialize, Serialize};

use crate::{require, Action, ModelError, Record};

/// Task lifecycle state, encoded on the wire as an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskState {
    #[default]
    Invalid,
    Pending,
    Claimed,
    Running,
    Completed,
    Resolving,
}

impl TaskState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Pending => 1,
            Self::Claimed => 2,
            Self::Running => 3,
            Self::Completed => 4,
            Self::Resolving => 5,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::Pending),
            2 => Some(Self::Claimed),
            3 => Some(Self::Running),
            4 => Some(Self::Completed),
            5 => Some(Self::Resolving),
            _ => None,
        }
    }
}

impl Serialize for TaskState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown task state: {value}")))
    }
}

/// Where a task's logs are shipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub source_name: String,
}

/// A unit of work that runs once to completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub task_guid: String,
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub executor_id: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub container_handle: String,
    #[serde(default)]
    pub result_file: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub failure_reason: String,
    #[serde(default)]
    pub memory_mb: i32,
    #[serde(default)]
    pub disk_mb: i32,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub log: LogConfig,
    /// Unix nanoseconds.
    #[serde(default)]
    pub created_at: i64,
    /// Unix nanoseconds.
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub annotation: String,
}

impl Record for Task {
    fn validate(&self) -> Result<(), ModelError> {
        require("domain", &self.domain)?;
        require("task_guid", &self.task_guid)?;
        require("stack", &self.stack)?;

        if self.actions.is_empty() {
            return Err(ModelError::invalid_field("actions"));
        }
        self.actions.iter().try_for_each(Action::validate)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::DownloadAction;

    const TASK_PAYLOAD: &str = r#"{
        "domain": "some-domain",
        "task_guid": "some-guid",
        "stack": "some-stack",
        "executor_id": "executor",
        "actions": [
            {
                "action": "download",
                "args": {
                    "from": "old_location",
                    "to": "new_location",
                    "cache_key": "the-cache-key"
                }
            }
        ],
        "container_handle": "17fgsafdfcvc",
        "result_file": "some-file.txt",
        "result": "turboencabulated",
        "failed": true,
        "failure_reason": "because i said so",
        "memory_mb": 256,
        "disk_mb": 1024,
        "cpu_percent": 42.25,
        "log": {
            "guid": "123",
            "source_name": "APP"
        },
        "created_at": 1393371971000000000,
        "updated_at": 1393371971000000010,
        "state": 1,
        "annotation": "[{\"anything\": \"you want!\"}]... dude"
    }"#;

    fn task() -> Task {
        Task {
            domain: "some-domain".to_string(),
            task_guid: "some-guid".to_string(),
            stack: "some-stack".to_string(),
            executor_id: "executor".to_string(),
            actions: vec![Action::Download(DownloadAction {
                from: "old_location".to_string(),
                to: "new_location".to_string(),
                cache_key: "the-cache-key".to_string(),
            })],
            container_handle: "17fgsafdfcvc".to_string(),
            result_file: "some-file.txt".to_string(),
            result: "turboencabulated".to_string(),
            failed: true,
            failure_reason: "because i said so".to_string(),
            memory_mb: 256,
            disk_mb: 1024,
            cpu_percent: 42.25,
            log: LogConfig {
                guid: "123".to_string(),
                source_name: "APP".to_string(),
            },
            created_at: 1_393_371_971_000_000_000,
            updated_at: 1_393_371_971_000_000_010,
            state: TaskState::Pending,
            annotation: r#"[{"anything": "you want!"}]... dude"#.to_string(),
        }
    }

    #[test]
    fn test_task_to_json() {
        let json: serde_json::Value = serde_json::from_slice(&task().to_json().unwrap()).unwrap();
        let expected: serde_json::Value = serde_json::from_str(TASK_PAYLOAD).unwrap();
        assert_eq!(json, expected);
    }

    #[test]
    fn test_task_from_json() {
        let decoded = Task::from_json(TASK_PAYLOAD.as_bytes()).unwrap();
        assert_eq!(decoded, task());
    }

    #[test]
    fn test_task_from_invalid_payload() {
        let err = Task::from_json(b"aliens lol").unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn test_task_unknown_state() {
        let payload = TASK_PAYLOAD.replace("\"state\": 1", "\"state\": 9");
        assert!(Task::from_json(payload.as_bytes()).is_err());
    }

    #[rstest]
    #[case(
        "task_guid",
        r#"{"domain": "some-domain", "stack": "some-stack", "actions": [{"action": "run", "args": {"path": "date"}}]}"#
    )]
    #[case(
        "actions",
        r#"{"domain": "some-domain", "task_guid": "process-guid", "stack": "some-stack"}"#
    )]
    #[case(
        "stack",
        r#"{"domain": "some-domain", "task_guid": "process-guid", "actions": [{"action": "run", "args": {"path": "date"}}]}"#
    )]
    #[case(
        "domain",
        r#"{"stack": "some-stack", "task_guid": "process-guid", "actions": [{"action": "run", "args": {"path": "date"}}]}"#
    )]
    fn test_task_missing_field(#[case] field: &str, #[case] payload: &str) {
        let err = Task::from_json(payload.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), format!("missing/invalid field: {field}"));
    }
}
