//! Cell presence records advertised by worker nodes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{require, ModelError, Record};

/// Live cells keyed by cell id.
pub type CellSet = HashMap<String, CellPresence>;

/// Resources a cell offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCapacity {
    pub memory_mb: i32,
    pub disk_mb: i32,
    pub containers: i32,
}

impl CellCapacity {
    pub fn new(memory_mb: i32, disk_mb: i32, containers: i32) -> Self {
        Self {
            memory_mb,
            disk_mb,
            containers,
        }
    }
}

/// A worker node that is currently alive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPresence {
    #[serde(default)]
    pub cell_id: String,
    #[serde(default)]
    pub rep_address: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub capacity: CellCapacity,
}

impl CellPresence {
    pub fn new(
        cell_id: impl Into<String>,
        rep_address: impl Into<String>,
        zone: impl Into<String>,
        capacity: CellCapacity,
    ) -> Self {
        Self {
            cell_id: cell_id.into(),
            rep_address: rep_address.into(),
            zone: zone.into(),
            capacity,
        }
    }
}

impl Record for CellPresence {
    fn validate(&self) -> Result<(), ModelError> {
        require("cell_id", &self.cell_id)?;
        require("rep_address", &self.rep_address)?;

        if self.capacity.memory_mb < 0 {
            return Err(ModelError::invalid_field("memory_mb"));
        }
        if self.capacity.disk_mb < 0 {
            return Err(ModelError::invalid_field("disk_mb"));
        }
        if self.capacity.containers < 0 {
            return Err(ModelError::invalid_field("containers"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_presence_roundtrip() {
        let cell = CellPresence::new("cell-1", "1.2.3.4", "az-1", CellCapacity::new(128, 1024, 3));
        let decoded = CellPresence::from_json(&cell.to_json().unwrap()).unwrap();
        assert_eq!(decoded, cell);
    }

    #[test]
    fn test_cell_presence_validation() {
        let mut cell = CellPresence::new("", "1.2.3.4", "az-1", CellCapacity::default());
        assert_eq!(cell.validate().unwrap_err().field(), Some("cell_id"));

        cell.cell_id = "cell-1".to_string();
        cell.capacity.containers = -1;
        assert_eq!(cell.validate().unwrap_err().field(), Some("containers"));
    }
}
