//! Long-running process records: desired specifications and actual instances.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{require, Action, EnvironmentVariable, ModelError, Record};

/// Crashed instances at or above this crash count are no longer restarted.
pub const MAX_CRASH_RESTARTS: i32 = 200;

/// Upper bound for [`DesiredLrp::cpu_weight`].
pub const MAX_CPU_WEIGHT: u32 = 100;

/// Desired specs keyed by process guid.
pub type DesiredLrpsByProcessGuid = HashMap<String, DesiredLrp>;

/// Actual instances keyed by process guid, then index.
pub type ActualLrpsByProcessGuidAndIndex = HashMap<String, HashMap<i32, ActualLrp>>;

/// Names of live domains.
pub type DomainSet = HashSet<String>;

// =============================================================================
// Desired
// =============================================================================

/// A workload specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredLrp {
    #[serde(default)]
    pub process_guid: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub rootfs: String,
    #[serde(default)]
    pub instances: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvironmentVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<Action>,
    /// Seconds an instance may take to become healthy.
    #[serde(default)]
    pub start_timeout: u32,
    #[serde(default)]
    pub disk_mb: i32,
    #[serde(default)]
    pub memory_mb: i32,
    #[serde(default)]
    pub cpu_weight: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub annotation: String,
}

impl Record for DesiredLrp {
    fn validate(&self) -> Result<(), ModelError> {
        require("process_guid", &self.process_guid)?;
        if self.process_guid.contains('/') {
            return Err(ModelError::invalid_field("process_guid"));
        }
        require("domain", &self.domain)?;
        require("rootfs", &self.rootfs)?;

        let Some(action) = &self.action else {
            return Err(ModelError::invalid_field("action"));
        };

        if self.instances < 0 {
            return Err(ModelError::invalid_field("instances"));
        }
        if self.memory_mb < 0 {
            return Err(ModelError::invalid_field("memory_mb"));
        }
        if self.disk_mb < 0 {
            return Err(ModelError::invalid_field("disk_mb"));
        }
        if self.cpu_weight > MAX_CPU_WEIGHT {
            return Err(ModelError::invalid_field("cpu_weight"));
        }

        if let Some(setup) = &self.setup {
            setup.validate()?;
        }
        action.validate()?;
        if let Some(monitor) = &self.monitor {
            monitor.validate()?;
        }

        Ok(())
    }
}

// =============================================================================
// Actual
// =============================================================================

/// Lifecycle state of an actual instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualLrpState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

impl ActualLrpState {
    /// Returns true if a record in this state must carry an instance key.
    pub fn requires_instance_key(&self) -> bool {
        matches!(self, Self::Claimed | Self::Running)
    }
}

/// Identity of an actual instance slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActualLrpKey {
    #[serde(default)]
    pub process_guid: String,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub domain: String,
}

impl ActualLrpKey {
    pub fn new(process_guid: impl Into<String>, index: i32, domain: impl Into<String>) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
            domain: domain.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        require("process_guid", &self.process_guid)?;
        if self.process_guid.contains('/') {
            return Err(ModelError::invalid_field("process_guid"));
        }
        if self.index < 0 {
            return Err(ModelError::invalid_field("index"));
        }
        require("domain", &self.domain)
    }
}

/// Which cell claimed an instance, and under what instance guid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActualLrpInstanceKey {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cell_id: String,
}

impl ActualLrpInstanceKey {
    pub fn new(instance_guid: impl Into<String>, cell_id: impl Into<String>) -> Self {
        Self {
            instance_guid: instance_guid.into(),
            cell_id: cell_id.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instance_guid.is_empty() && self.cell_id.is_empty()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        require("instance_guid", &self.instance_guid)?;
        require("cell_id", &self.cell_id)
    }
}

/// A container port exposed on a host port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// Where a running instance can be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLrpNetInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
}

impl ActualLrpNetInfo {
    pub fn new(address: impl Into<String>, ports: Vec<PortMapping>) -> Self {
        Self {
            address: address.into(),
            ports,
        }
    }
}

/// An observed instance of a long-running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLrp {
    #[serde(flatten)]
    pub key: ActualLrpKey,
    #[serde(flatten)]
    pub instance_key: ActualLrpInstanceKey,
    #[serde(flatten)]
    pub net_info: ActualLrpNetInfo,
    #[serde(default)]
    pub crash_count: i32,
    pub state: ActualLrpState,
    /// Unix nanoseconds of the last state transition. Zero marks a corrupt record.
    #[serde(default)]
    pub since: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub placement_error: String,
}

impl ActualLrp {
    /// An unclaimed instance slot.
    pub fn unclaimed(key: ActualLrpKey, since: i64) -> Self {
        Self {
            key,
            instance_key: ActualLrpInstanceKey::default(),
            net_info: ActualLrpNetInfo::default(),
            crash_count: 0,
            state: ActualLrpState::Unclaimed,
            since,
            placement_error: String::new(),
        }
    }

    pub fn process_guid(&self) -> &str {
        &self.key.process_guid
    }

    pub fn index(&self) -> i32 {
        self.key.index
    }

    /// Returns true if the instance may be (re)started.
    ///
    /// Crashed instances stay startable until they reach [`MAX_CRASH_RESTARTS`].
    pub fn is_startable(&self) -> bool {
        match self.state {
            ActualLrpState::Unclaimed => true,
            ActualLrpState::Crashed => self.crash_count < MAX_CRASH_RESTARTS,
            ActualLrpState::Claimed | ActualLrpState::Running => false,
        }
    }
}

impl Record for ActualLrp {
    fn validate(&self) -> Result<(), ModelError> {
        self.key.validate()?;

        if self.since == 0 {
            return Err(ModelError::invalid_field("since"));
        }
        if self.crash_count < 0 {
            return Err(ModelError::invalid_field("crash_count"));
        }
        if self.state.requires_instance_key() {
            self.instance_key.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunAction;

    fn desired() -> DesiredLrp {
        DesiredLrp {
            process_guid: "process-guid".to_string(),
            domain: "test-domain".to_string(),
            rootfs: "some:rootfs".to_string(),
            instances: 4,
            memory_mb: 1024,
            disk_mb: 512,
            cpu_weight: 42,
            action: Some(Action::Run(RunAction {
                path: "ls".to_string(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn running(index: i32) -> ActualLrp {
        ActualLrp {
            key: ActualLrpKey::new("process-guid", index, "test-domain"),
            instance_key: ActualLrpInstanceKey::new("instance-guid", "cell-1"),
            net_info: ActualLrpNetInfo::new(
                "1.2.3.4",
                vec![PortMapping {
                    container_port: 8080,
                    host_port: 61001,
                }],
            ),
            crash_count: 0,
            state: ActualLrpState::Running,
            since: 1138,
            placement_error: String::new(),
        }
    }

    #[test]
    fn test_desired_lrp_json_roundtrip() {
        let lrp = desired();
        let bytes = lrp.to_json().unwrap();
        assert_eq!(DesiredLrp::from_json(&bytes).unwrap(), lrp);
    }

    #[test]
    fn test_desired_lrp_garbage_bytes() {
        let err = DesiredLrp::from_json("ßßßßßß".as_bytes()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn test_desired_lrp_requires_fields() {
        let cases: Vec<(&str, Box<dyn Fn(&mut DesiredLrp)>)> = vec![
            ("process_guid", Box::new(|d: &mut DesiredLrp| d.process_guid.clear())),
            ("process_guid", Box::new(|d: &mut DesiredLrp| d.process_guid = "a/b".to_string())),
            ("domain", Box::new(|d: &mut DesiredLrp| d.domain.clear())),
            ("rootfs", Box::new(|d: &mut DesiredLrp| d.rootfs.clear())),
            ("action", Box::new(|d: &mut DesiredLrp| d.action = None)),
            ("instances", Box::new(|d: &mut DesiredLrp| d.instances = -1)),
            ("memory_mb", Box::new(|d: &mut DesiredLrp| d.memory_mb = -1)),
            ("disk_mb", Box::new(|d: &mut DesiredLrp| d.disk_mb = -1)),
            ("cpu_weight", Box::new(|d: &mut DesiredLrp| d.cpu_weight = 101)),
        ];

        for (field, mutate) in cases {
            let mut lrp = desired();
            mutate(&mut lrp);
            assert_eq!(lrp.validate().unwrap_err().field(), Some(field));
        }
    }

    #[test]
    fn test_desired_lrp_only_guid_is_invalid() {
        let json = br#"{"process_guid": "invalid-desired-1"}"#;
        let err = DesiredLrp::from_json(json).unwrap_err();
        assert_eq!(err.field(), Some("domain"));
    }

    #[test]
    fn test_actual_lrp_wire_format_is_flat() {
        let json = serde_json::to_value(running(2)).unwrap();
        assert_eq!(json["process_guid"], "process-guid");
        assert_eq!(json["index"], 2);
        assert_eq!(json["cell_id"], "cell-1");
        assert_eq!(json["address"], "1.2.3.4");
        assert_eq!(json["state"], "running");

        let decoded = ActualLrp::from_json(&serde_json::to_vec(&json).unwrap()).unwrap();
        assert_eq!(decoded, running(2));
    }

    #[test]
    fn test_actual_lrp_zero_since_is_invalid() {
        for state in [
            ActualLrpState::Unclaimed,
            ActualLrpState::Claimed,
            ActualLrpState::Running,
            ActualLrpState::Crashed,
        ] {
            let mut lrp = running(0);
            lrp.state = state;
            lrp.since = 0;
            assert_eq!(lrp.validate().unwrap_err().field(), Some("since"));
        }
    }

    #[test]
    fn test_claimed_requires_instance_key() {
        let mut lrp = running(0);
        lrp.state = ActualLrpState::Claimed;
        lrp.instance_key = ActualLrpInstanceKey::default();
        assert_eq!(lrp.validate().unwrap_err().field(), Some("instance_guid"));

        lrp.instance_key = ActualLrpInstanceKey::new("instance-guid", "");
        assert_eq!(lrp.validate().unwrap_err().field(), Some("cell_id"));
    }

    #[test]
    fn test_unclaimed_and_crashed_need_no_instance_key() {
        let lrp = ActualLrp::unclaimed(ActualLrpKey::new("process-guid", 0, "d"), 1138);
        assert!(lrp.validate().is_ok());

        let mut crashed = lrp.clone();
        crashed.state = ActualLrpState::Crashed;
        crashed.crash_count = 1;
        assert!(crashed.validate().is_ok());
    }

    #[test]
    fn test_startable() {
        let mut lrp = ActualLrp::unclaimed(ActualLrpKey::new("process-guid", 0, "d"), 1138);
        assert!(lrp.is_startable());

        lrp.state = ActualLrpState::Crashed;
        lrp.crash_count = 1;
        assert!(lrp.is_startable());

        lrp.crash_count = MAX_CRASH_RESTARTS - 1;
        assert!(lrp.is_startable());

        lrp.crash_count = MAX_CRASH_RESTARTS;
        assert!(!lrp.is_startable());

        lrp.crash_count = MAX_CRASH_RESTARTS + 1;
        assert!(!lrp.is_startable());

        assert!(!running(0).is_startable());
    }

    #[test]
    fn test_actual_lrp_key_validation() {
        assert_eq!(
            ActualLrpKey::new("guid", -1, "d").validate().unwrap_err().field(),
            Some("index")
        );
        assert_eq!(
            ActualLrpKey::new("", 0, "d").validate().unwrap_err().field(),
            Some("process_guid")
        );
        assert_eq!(
            ActualLrpKey::new("guid", 0, "").validate().unwrap_err().field(),
            Some("domain")
        );
    }
}
