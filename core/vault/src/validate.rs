//! JSON-schema validation of decrypted vault documents.
//!
//! Validation only applies from schema major 7 onwards: earlier schemas
//! predate the schema document and would fail it spuriously, so they are
//! unvalidated by design.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use seedvault_common::{Error, Result};

/// First schema major authored against the JSON-schema definition.
pub const SCHEMA_VALIDATED_FROM: u32 = 7;

const VAULT_SCHEMA: &str = include_str!("vault.schema.json");

/// Compiled vault document validator.
pub struct Validator {
    compiled: JSONSchema,
    redact_errors: bool,
}

impl Validator {
    /// Compile the embedded schema.
    ///
    /// With `redact_errors` set (production builds), validation failures
    /// carry an empty error list: surfaced to telemetry, not to the user.
    /// Without it the raw validator errors come back for developers.
    ///
    /// # Errors
    /// - `Fatal` if the embedded schema itself does not compile
    pub fn new(redact_errors: bool) -> Result<Self> {
        let schema: Value = serde_json::from_str(VAULT_SCHEMA)
            .map_err(|e| Error::Fatal(format!("Embedded vault schema is not JSON: {}", e)))?;
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| Error::Fatal(format!("Embedded vault schema failed to compile: {}", e)))?;
        Ok(Self {
            compiled,
            redact_errors,
        })
    }

    /// Validate a document if its schema major is in the validated era.
    ///
    /// # Errors
    /// - `SchemaValidation` with raw or redacted errors on failure
    pub fn validate(&self, doc: &Value) -> Result<()> {
        let major = doc
            .get("schemaMajor")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        if major < SCHEMA_VALIDATED_FROM {
            return Ok(());
        }

        if let Err(validation_errors) = self.compiled.validate(doc) {
            let errors = if self.redact_errors {
                Vec::new()
            } else {
                validation_errors
                    .map(|e| format!("{} at {}", e, e.instance_path))
                    .collect()
            };
            return Err(Error::SchemaValidation { errors });
        }
        Ok(())
    }
}
