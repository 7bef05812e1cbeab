//! JSON Schema validation of data catalogs

use crate::catalog::parser::Parsed;
use crate::envelope::{keys, Envelope, StageError};
use crate::storage::ReportType;
use crate::ProbeError;
use jsonschema::{Draft, JSONSchema, ValidationError};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;

/// Maximum number of schema violations recorded for one catalog
pub const SCHEMA_ERROR_LIMIT: usize = 100;

/// The data catalog schema, compiled once and shared read-only
pub struct CatalogSchema {
    compiled: JSONSchema,
    raw: Value,
}

impl CatalogSchema {
    /// Loads and compiles a Draft 4 schema from a JSON file
    pub fn load(path: &Path) -> Result<Self, ProbeError> {
        let content = std::fs::read_to_string(path)?;
        let raw: Value = serde_json::from_str(&content).map_err(|e| {
            ProbeError::Schema(format!(
                "Failed to parse catalog schema {}: {}",
                path.display(),
                e
            ))
        })?;
        let schema = Self::from_value(raw)?;
        tracing::info!("Loaded catalog schema from {}", path.display());
        Ok(schema)
    }

    pub fn from_value(raw: Value) -> Result<Self, ProbeError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft4)
            .compile(&raw)
            .map_err(|e| ProbeError::Schema(format!("Failed to compile catalog schema: {}", e)))?;

        Ok(Self { compiled, raw })
    }

    pub fn is_valid(&self, document: &Value) -> bool {
        self.compiled.is_valid(document)
    }

    /// Lazily yields every violation of `document`
    ///
    /// Callers cap how many they take; a large catalog can produce one
    /// violation per item.
    pub fn violations<'a>(&'a self, document: &'a Value) -> impl Iterator<Item = StageError> + 'a {
        self.compiled
            .validate(document)
            .err()
            .into_iter()
            .flatten()
            .map(move |error| self.describe(&error))
    }

    fn describe(&self, error: &ValidationError<'_>) -> StageError {
        // The last schema path segment is the failing keyword; its parent is
        // the subschema that holds it.
        let schema_path = error.schema_path.to_string();
        let parent = schema_path
            .rfind('/')
            .map_or("", |idx| &schema_path[..idx]);
        let schema = self
            .raw
            .pointer(parent)
            .map_or_else(|| schema_path.clone(), Value::to_string);

        StageError::SchemaViolation {
            message: error.to_string(),
            instance_path: error.instance_path.to_string(),
            schema,
        }
    }
}

impl fmt::Debug for CatalogSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSchema").finish_non_exhaustive()
    }
}

/// Outcome of validating one catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
    /// No schema is configured
    NoSchema,
    /// There was no JSON document to validate
    NoDocument,
}

impl Validity {
    /// Only a document that was actually checked and passed is valid
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::NoSchema => "no_schema",
            Self::NoDocument => "no_document",
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of [`validate_json_catalog`]
#[derive(Debug, Clone)]
pub struct Validated {
    pub envelope: Envelope,
    pub json: Option<Value>,
    pub validity: Validity,
}

/// Validates a parsed catalog, recording up to [`SCHEMA_ERROR_LIMIT`]
/// violations
///
/// The outcome is written to `response_info.is_valid_data_catalog` and
/// `response_info.schema_validation`, and the envelope's report type is set
/// to a validation report.
pub fn validate_json_catalog(parsed: Parsed, schema: Option<&CatalogSchema>) -> Validated {
    let Parsed {
        mut envelope, json, ..
    } = parsed;

    let validity = match (&json, schema) {
        (None, _) => Validity::NoDocument,
        (Some(_), None) => Validity::NoSchema,
        (Some(document), Some(schema)) => {
            if schema.is_valid(document) {
                Validity::Valid
            } else {
                for violation in schema.violations(document).take(SCHEMA_ERROR_LIMIT) {
                    envelope.record(violation);
                }
                Validity::Invalid
            }
        }
    };

    tracing::debug!("Catalog validation outcome: {}", validity);

    let info = envelope.object_mut(keys::RESPONSE_INFO);
    info.insert(
        "is_valid_data_catalog".to_string(),
        json!(validity.is_valid()),
    );
    info.insert("schema_validation".to_string(), json!(validity.as_str()));
    envelope.insert(
        keys::REPORT_TYPE,
        ReportType::DataCatalogValidation.to_db_string(),
    );

    Validated {
        envelope,
        json,
        validity,
    }
}
