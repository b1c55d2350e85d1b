//! JSON Schema handling for registered event schemas.
//!
//! Schema documents are checked against the Draft 7 meta-schema when they are
//! registered, and event payloads are validated against the compiled schema
//! before they are published.

use jsonschema::{Draft, JSONSchema, ValidationError};
use serde_json::Value;

/// A registered schema, compiled for payload validation.
pub struct EventSchema {
    compiled: JSONSchema,
}

impl EventSchema {
    /// Parses and compiles a schema document.
    ///
    /// Fails with a readable message when `raw` is not JSON or does not
    /// conform to the Draft 7 meta-schema.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let document: Value =
            serde_json::from_str(raw).map_err(|e| format!("Schema is not valid JSON: {e}"))?;

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&document)
            .map_err(|e| format!("Invalid JSON Schema: {}", describe(&e)))?;

        Ok(Self { compiled })
    }

    /// Validates a payload, returning every violation joined with `"; "`.
    pub fn validate(&self, payload: &Value) -> Result<(), String> {
        let Err(errors) = self.compiled.validate(payload) else {
            return Ok(());
        };

        let mut violations: Vec<(String, String)> = errors
            .map(|e| (e.instance_path.to_string(), describe(&e)))
            .collect();
        violations.sort();

        Err(violations
            .into_iter()
            .map(|(_, message)| message)
            .collect::<Vec<_>>()
            .join("; "))
    }
}

fn describe(error: &ValidationError<'_>) -> String {
    let path = error.instance_path.to_string();
    if path.is_empty() {
        error.to_string()
    } else {
        format!("{error} at {path}")
    }
}
