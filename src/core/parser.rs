//! Template parsing and validation.
//!
//! Checks top-level document shape before any evaluation:
//! - Only whitelisted top-level keys
//! - `format-version` and `resources` present
//! - `format-version` equal to the supported literal
//! - Supplied parameter values name declared parameters

use super::error::StackError;
use super::types::*;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;

static STACK_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("stack id pattern")
});

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Read a template body from disk.
pub fn read_template_file(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))
}

/// Parse a template body as JSON.
pub fn parse_template(body: &str) -> Result<Value, StackError> {
    Ok(serde_json::from_str(body)?)
}

/// Validate a parsed document. Returns a list of errors (empty = valid).
pub fn validate_template(doc: &Value) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(map) = doc.as_object() else {
        errors.push(ValidationError {
            message: "template must be a JSON object".to_string(),
        });
        return errors;
    };

    for key in map.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            errors.push(ValidationError {
                message: format!("unknown top-level key '{}'", key),
            });
        }
    }

    for key in REQUIRED_KEYS {
        if !map.contains_key(key) {
            errors.push(ValidationError {
                message: format!("'{}' is not set", key),
            });
        }
    }

    if let Some(version) = map.get("format-version") {
        if version.as_str() != Some(FORMAT_VERSION) {
            errors.push(ValidationError {
                message: format!(
                    "unsupported format-version {}, expected \"{}\"",
                    version, FORMAT_VERSION
                ),
            });
        }
    }

    if let Some(resources) = map.get("resources") {
        if !resources.is_object() {
            errors.push(ValidationError {
                message: "'resources' must be a mapping".to_string(),
            });
        }
    }

    if let Some(parameters) = map.get("parameters") {
        if !parameters.is_object() {
            errors.push(ValidationError {
                message: "'parameters' must be a mapping".to_string(),
            });
        }
    }

    errors
}

/// Validate and convert a parsed document into a typed template.
pub fn prepare_template(doc: &Value) -> Result<Template, StackError> {
    let errors = validate_template(doc);
    if !errors.is_empty() {
        return Err(StackError::TemplateInvalid(join_errors(&errors)));
    }
    serde_json::from_value(doc.clone()).map_err(|e| StackError::TemplateInvalid(e.to_string()))
}

/// Collect supplied parameters, rejecting names the template does not declare.
pub fn check_parameters(
    template: &Template,
    supplied: &[(String, String)],
) -> Result<IndexMap<String, String>, StackError> {
    let mut values = IndexMap::new();
    for (name, value) in supplied {
        if !template.parameters.contains_key(name) {
            return Err(StackError::TemplateInvalid(format!(
                "parameter '{}' is not declared",
                name
            )));
        }
        values.insert(name.clone(), value.clone());
    }
    Ok(values)
}

/// Check a stack identifier against the accepted pattern.
pub fn validate_stack_id(stack_id: &str) -> Result<(), StackError> {
    if STACK_ID_RE.is_match(stack_id) {
        Ok(())
    } else {
        Err(StackError::InvalidStackId(stack_id.to_string()))
    }
}

/// BLAKE3 fingerprint of a template body. Returns `"blake3:{hex}"`.
pub fn fingerprint(body: &str) -> String {
    format!("blake3:{}", blake3::hash(body.as_bytes()).to_hex())
}

/// Load engine settings from a YAML file.
pub fn load_settings(path: &Path) -> Result<Settings, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_yaml_ng::from_str(&content).map_err(|e| format!("YAML parse error: {}", e))
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
