//! Error types for record decoding and validation.

use thiserror::Error;

/// Errors that can occur when decoding or validating a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A required field is missing or holds a nonsensical value.
    #[error("missing/invalid field: {0}")]
    InvalidField(String),

    /// The bytes are not a JSON document of the expected shape.
    #[error("malformed JSON: {0}")]
    Malformed(String),
}

impl ModelError {
    pub(crate) fn invalid_field(field: &str) -> Self {
        ModelError::InvalidField(field.to_string())
    }

    /// Returns the offending field name, if this is a field error.
    pub fn field(&self) -> Option<&str> {
        match self {
            ModelError::InvalidField(field) => Some(field),
            ModelError::Malformed(_) => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Malformed(err.to_string())
    }
}
