//! # bbs-models
//!
//! Record types stored on the bulletin board.
//!
//! ## Records
//!
//! - [`DesiredLrp`]: a workload specification, keyed by process guid
//! - [`ActualLrp`]: an observed instance, keyed by process guid and index
//! - [`CellPresence`]: an advertised worker node
//! - [`Task`]: a one-off unit of work
//!
//! Every record is JSON-encoded in the store. Decoding always validates, so a
//! value obtained through [`Record::from_json`] is structurally sound. Bytes that
//! fail to parse and bytes that parse into an invalid record are reported the
//! same way (a [`ModelError`]), which is what lets the convergence pass treat
//! both as prunable.

mod action;
mod cell;
mod error;
mod lrp;
mod task;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use action::*;
pub use cell::*;
pub use error::ModelError;
pub use lrp::*;
pub use task::*;

/// A JSON-encoded record with a validation schema.
pub trait Record: Serialize + DeserializeOwned {
    /// Check that every required field is present and value-sensible.
    fn validate(&self) -> Result<(), ModelError>;

    /// Decode and validate a record.
    fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        let record: Self = serde_json::from_slice(bytes)?;
        record.validate()?;
        Ok(record)
    }

    /// Encode a record.
    fn to_json(&self) -> Result<Vec<u8>, ModelError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Returns `Err(InvalidField)` when `value` is empty.
pub(crate) fn require(field: &str, value: &str) -> Result<(), ModelError> {
    if value.is_empty() {
        return Err(ModelError::invalid_field(field));
    }
    Ok(())
}
