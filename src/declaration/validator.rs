//! Structural validation of declarations.
//!
//! Schema validation is delegated to the compiled root schema held by the
//! [`SchemaRegistry`]. Before the schema runs, the declaration identity is
//! checked, since a declaration without a usable `id` cannot be reported on.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::pointer::DeclarationPath;
use super::profile::DeviceProfile;
use crate::schema::SchemaRegistry;

lazy_static! {
    /// Characters accepted in a declaration `id`.
    static ref DECLARATION_ID_REGEX: Regex = Regex::new(r#"^[^\x00-\x20"'<>\\^`|\x7f]{1,255}$"#)
        .expect("DECLARATION_ID_REGEX should be a valid regex pattern");
}

/// Properties that identify a declaration rather than declare anything.
const IDENTITY_PROPERTIES: &[&str] = &["id", "class", "schemaVersion", "$schema"];

/// A single structural problem found in a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub path: DeclarationPath,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: DeclarationPath, message: impl Into<String>) -> Self {
        Self { path, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of validating one declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The error surfaced to callers when only one can be shown.
    pub fn primary(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    /// Messages in `path: message` form, primary first.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Validates candidate declarations against the registry's root schema.
pub struct DeclarationValidator<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> DeclarationValidator<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Run the identity check and then the schema. The device profile does
    /// not relax any rule; it is recorded for diagnostics only.
    pub fn validate(&self, declaration: &Value, device: DeviceProfile) -> ValidationReport {
        if let Some(error) = check_identity(declaration) {
            tracing::debug!(device = %device, "declaration rejected before schema validation");
            return ValidationReport { errors: vec![error] };
        }

        let errors = self.registry.validate(declaration);
        tracing::debug!(
            device = %device,
            schema = self.registry.root_id().unwrap_or_default(),
            error_count = errors.len(),
            "declaration validated against schema"
        );
        ValidationReport { errors }
    }
}

/// Returns an error when the declaration has no valid `id` or nothing but
/// identity properties.
pub fn check_identity(declaration: &Value) -> Option<ValidationError> {
    let Value::Object(map) = declaration else {
        return Some(ValidationError::new(DeclarationPath::root(), "declaration must be an object"));
    };

    let has_valid_id = map
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| DECLARATION_ID_REGEX.is_match(id));
    let has_content = map.keys().any(|key| !IDENTITY_PROPERTIES.contains(&key.as_str()));

    if has_valid_id && has_content {
        None
    } else {
        Some(ValidationError::new(DeclarationPath::root(), "declaration lacks valid 'id'"))
    }
}
