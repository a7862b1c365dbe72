//! Serializer: schema validation, JSON rendering and the `var <name> = ...`
//! script the browser runner loads.

use std::fs;
use std::path::Path;

use jsonschema::Validator;
use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::document::ExperimentDocument;
use crate::validate::ExperimentError;

/// The runner's document schema (JSON Schema draft-07).
pub const SCHEMA_SOURCE: &str = include_str!("../schema/experiment.schema.json");

lazy_static! {
    static ref VAR_NAME: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
    static ref EXPERIMENT_SCHEMA: Value = serde_json::from_str(SCHEMA_SOURCE).unwrap();
    static ref SCHEMA_VALIDATOR: Validator = jsonschema::validator_for(&EXPERIMENT_SCHEMA).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Spaces per indentation level.
    pub indent: usize,
    /// End the script with `;`.
    pub trailing_semicolon: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            trailing_semicolon: false,
        }
    }
}

impl EmitOptions {
    /// Missing keys take their defaults.
    pub fn from_json_str(source: &str) -> Result<Self, ExperimentError> {
        Ok(serde_json::from_str(source)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn schema() -> &'static Value {
    &EXPERIMENT_SCHEMA
}

/// Checks `value` against the runner schema, reporting every violation.
pub fn validate_against_schema(value: &Value) -> Result<(), ExperimentError> {
    let diagnostics: Vec<String> = SCHEMA_VALIDATOR
        .iter_errors(value)
        .map(|error| error.to_string())
        .collect();
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(ExperimentError::SchemaValidation {
            diagnostics: diagnostics.join("; "),
        })
    }
}

/// Schema-checks the document, then renders it with the configured
/// indentation. Field order follows the wire types, so equal documents
/// render to equal bytes.
pub fn render_json(
    document: &ExperimentDocument,
    options: &EmitOptions,
) -> Result<String, ExperimentError> {
    let value = serde_json::to_value(document)?;
    validate_against_schema(&value)?;
    debug!("document matches schema");

    let indent = " ".repeat(options.indent);
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(indent.as_bytes()));
    document.serialize(&mut serializer)?;
    String::from_utf8(buffer).map_err(|e| ExperimentError::Json(serde_json::Error::custom(e)))
}

pub fn wrap_as_script(
    var_name: &str,
    json: &str,
    options: &EmitOptions,
) -> Result<String, ExperimentError> {
    if !VAR_NAME.is_match(var_name) {
        return Err(ExperimentError::InvalidVarName(var_name.to_string()));
    }
    let terminator = if options.trailing_semicolon { ";" } else { "" };
    Ok(format!("var {} = {}{}", var_name, json, terminator))
}

/// SHA-256 of `text`, lowercase hex.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Nothing is written unless rendering and validation both succeed.
pub(crate) fn write_document(
    document: &ExperimentDocument,
    path: &Path,
    var_name: &str,
    options: &EmitOptions,
) -> Result<(), ExperimentError> {
    let json = render_json(document, options)?;
    let script = wrap_as_script(var_name, &json, options)?;
    fs::write(path, &script).map_err(|source| ExperimentError::Io {
        context: format!("writing {}", path.display()),
        source,
    })?;

    info!(
        path = %path.display(),
        bytes = script.len(),
        fingerprint = %fingerprint(&script),
        "experiment written"
    );
    Ok(())
}
