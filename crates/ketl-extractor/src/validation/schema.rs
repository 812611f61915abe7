//! Structural schema for incoming records

use jsonschema::{Draft, Validator};
use serde_json::Value;
use std::path::Path;

use super::ValidationError;

/// Schema shipped with the service.
pub const EMBEDDED_SCHEMA: &str = include_str!("../../schemas/review.schema.json");

/// Compiled JSON Schema (Draft 7) for the review payload
pub struct StructuralSchema {
    validator: Validator,
}

impl std::fmt::Debug for StructuralSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuralSchema").finish_non_exhaustive()
    }
}

impl StructuralSchema {
    /// Compile a schema from its JSON text
    pub fn parse(schema: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(schema)
            .map_err(|e| ValidationError::InvalidSchema(format!("schema is not JSON: {e}")))?;

        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(&value)
            .map_err(|e| ValidationError::InvalidSchema(e.to_string()))?;

        Ok(Self { validator })
    }

    /// Schema embedded at compile time
    pub fn embedded() -> Result<Self, ValidationError> {
        Self::parse(EMBEDDED_SCHEMA)
    }

    /// Load and compile an external schema file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::InvalidSchema(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Check a document, collecting every violation into one message
    pub fn check(&self, document: &Value) -> Result<(), ValidationError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(document)
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Schema(errors.join("; ")))
        }
    }
}
