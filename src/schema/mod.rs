//! # Schemas
//!
//! The [`SchemaRegistry`] holds every JSON-Schema document a parser knows
//! about and the compiled validator for the root document. Schemas are
//! loaded from inline JSON, URLs or files; the last one loaded is the root
//! and the others are registered as resources it may reference.
//!
//! The compiled validator is read-only once loading finishes.

pub mod defaults;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::Instrument;
use url::Url;

use crate::declaration::{DeclarationPath, ValidationError};
use crate::errors::{AdcError, Result};
use crate::tags::fetch::DEFAULT_FETCH_TIMEOUT;

pub use defaults::DefaultExpander;

/// The built-in ADC schema.
pub const DEFAULT_SCHEMA: &str = include_str!("adc-schema.json");

/// Base for schema ids that are not absolute URIs.
const RELATIVE_ID_BASE: &str = "json-schema:///";

/// Where a schema comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSource {
    Inline(Value),
    Url(Url),
    Path(PathBuf),
}

impl TryFrom<Value> for SchemaSource {
    type Error = AdcError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) => Ok(SchemaSource::Inline(value)),
            Value::String(text) => Ok(SchemaSource::parse(&text)),
            _ => Err(AdcError::invalid_argument(
                "loadSchemas argument must be schema, URL, or filename",
            )),
        }
    }
}

impl SchemaSource {
    /// `http(s)` URLs become [`SchemaSource::Url`]; anything else is a file path.
    pub fn parse(text: &str) -> Self {
        match Url::parse(text) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => SchemaSource::Url(url),
            _ => SchemaSource::Path(PathBuf::from(text)),
        }
    }
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSource::Inline(schema) => match schema_id(schema) {
                Some(id) => write!(f, "{}", id),
                None => write!(f, "<inline schema>"),
            },
            SchemaSource::Url(url) => write!(f, "{}", url),
            SchemaSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

struct CompiledRoot {
    id: String,
    validator: Arc<Validator>,
}

/// Schema documents by `$id` plus the compiled root validator.
pub struct SchemaRegistry {
    client: reqwest::Client,
    fetch_timeout: Duration,
    documents: HashMap<String, Value>,
    root: Option<CompiledRoot>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("fetch_timeout", &self.fetch_timeout)
            .field("ids", &self.ids())
            .field("root", &self.root_id())
            .finish()
    }
}

impl SchemaRegistry {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            fetch_timeout,
            documents: HashMap::new(),
            root: None,
        }
    }

    /// Load the built-in schema as root.
    pub fn load_default(&mut self) -> Result<String> {
        let schema: Value = serde_json::from_str(DEFAULT_SCHEMA)
            .map_err(|e| AdcError::schema_load("default schema", e.to_string()))?;
        let mut ids = self.load_documents(vec![schema])?;
        ids.pop().ok_or_else(|| AdcError::schema_shape("default schema"))
    }

    /// Load schemas from `sources` and return their ids in input order.
    ///
    /// `None` or an empty list loads the built-in schema.
    pub async fn load_schemas(&mut self, sources: Option<Vec<SchemaSource>>) -> Result<Vec<String>> {
        let sources = sources.unwrap_or_default();
        if sources.is_empty() {
            return self.load_default().map(|id| vec![id]);
        }

        let span = crate::schema_span!("load_schemas");
        async move {
            let mut documents = Vec::with_capacity(sources.len());
            for source in &sources {
                let document = self.read(source).await.inspect_err(log_failure)?;
                if schema_id(&document).is_none() {
                    let error = AdcError::schema_shape(source.to_string());
                    log_failure(&error);
                    return Err(error);
                }
                documents.push(document);
            }
            self.load_documents(documents)
        }
        .instrument(span)
        .await
    }

    /// Like [`SchemaRegistry::load_schemas`] but takes the raw JSON argument:
    /// `null` or an array of schema objects, URLs and file names.
    pub async fn load_schemas_json(&mut self, sources: &Value) -> Result<Vec<String>> {
        let sources = match sources {
            Value::Null => None,
            Value::Array(items) => Some(
                items
                    .iter()
                    .cloned()
                    .map(SchemaSource::try_from)
                    .collect::<Result<Vec<_>>>()
                    .inspect_err(log_failure)?,
            ),
            _ => {
                let error = AdcError::invalid_argument("loadSchemas argument must be an Array");
                log_failure(&error);
                return Err(error);
            }
        };
        self.load_schemas(sources).await
    }

    /// Register already-parsed documents; the last becomes the compiled root.
    pub fn load_documents(&mut self, documents: Vec<Value>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            let id = schema_id(&document)
                .map(str::to_string)
                .ok_or_else(|| AdcError::schema_shape("<inline schema>"))
                .inspect_err(log_failure)?;
            self.documents.insert(id.clone(), document);
            ids.push(id);
        }

        if let Some(root_id) = ids.last() {
            self.compile(root_id).inspect_err(log_failure)?;
        }
        tracing::info!(schema_ids = ?ids, "schemas loaded");
        Ok(ids)
    }

    async fn read(&self, source: &SchemaSource) -> Result<Value> {
        match source {
            SchemaSource::Inline(schema) => Ok(schema.clone()),
            SchemaSource::Url(url) => {
                let failed = |e: reqwest::Error| AdcError::schema_load(url.as_str(), e.to_string());
                self.client
                    .get(url.clone())
                    .timeout(self.fetch_timeout)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(failed)?
                    .json::<Value>()
                    .await
                    .map_err(failed)
            }
            SchemaSource::Path(path) => {
                let name = path.display().to_string();
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| AdcError::schema_load(name.as_str(), e.to_string()))?;
                serde_json::from_str(&text).map_err(|e| AdcError::schema_load(name, e.to_string()))
            }
        }
    }

    fn compile(&mut self, root_id: &str) -> Result<()> {
        let root = self
            .documents
            .get(root_id)
            .ok_or_else(|| AdcError::schema_shape(root_id))?;

        let mut options = Validator::options();
        options.with_draft(Draft::Draft7);
        for (id, document) in self.documents.iter().filter(|(id, _)| id.as_str() != root_id) {
            options.with_resource(
                resource_uri(id),
                Draft::Draft7.create_resource(with_absolute_id(document, id)),
            );
        }

        let validator = options.build(&with_absolute_id(root, root_id)).map_err(|e| {
            AdcError::SchemaCompile { id: root_id.to_string(), message: e.to_string() }
        })?;

        tracing::debug!(schema_id = root_id, resources = self.documents.len() - 1, "root schema compiled");
        self.root = Some(CompiledRoot { id: root_id.to_string(), validator: Arc::new(validator) });
        Ok(())
    }

    /// Validate against the compiled root. An unloaded registry reports nothing.
    pub fn validate(&self, declaration: &Value) -> Vec<ValidationError> {
        let Some(root) = &self.root else {
            tracing::warn!("no root schema loaded, skipping schema validation");
            return Vec::new();
        };
        root.validator.iter_errors(declaration).map(|error| to_validation_error(&error)).collect()
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root.as_ref().map(|root| root.id.as_str())
    }

    pub fn document(&self, id: &str) -> Option<&Value> {
        self.entry(id).map(|(_, document)| document)
    }

    /// Look up a document by `$id`, or by the URI a relative `$id` resolves to.
    pub fn entry(&self, id: &str) -> Option<(&str, &Value)> {
        self.documents
            .get_key_value(id)
            .or_else(|| self.documents.iter().find(|(known, _)| resource_uri(known) == id))
            .map(|(known, document)| (known.as_str(), document))
    }

    /// Known ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.documents.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

fn log_failure(error: &AdcError) {
    tracing::error!(error = %error, "schema loading failed");
}

fn schema_id(schema: &Value) -> Option<&str> {
    schema.get("$id").and_then(Value::as_str).filter(|id| !id.is_empty())
}

fn resource_uri(id: &str) -> String {
    match Url::parse(id) {
        Ok(_) => id.to_string(),
        Err(_) => format!("{}{}", RELATIVE_ID_BASE, id),
    }
}

fn with_absolute_id(document: &Value, id: &str) -> Value {
    let mut document = document.clone();
    if let Some(map) = document.as_object_mut() {
        map.insert("$id".to_string(), Value::String(resource_uri(id)));
    }
    document
}

/// Map a compiler error to a declaration error with the usual wording.
fn to_validation_error(error: &jsonschema::ValidationError<'_>) -> ValidationError {
    let path = DeclarationPath::from_pointer(&error.instance_path.to_string());
    ValidationError::new(path, message_for(error))
}

fn message_for(error: &jsonschema::ValidationError<'_>) -> String {
    match &error.kind {
        ValidationErrorKind::Required { property } => match property.as_str() {
            Some(name) => format!("should have required property '{}'", name),
            None => format!("should have required property {}", property),
        },
        ValidationErrorKind::Pattern { pattern } => {
            let instance = match error.instance.as_ref() {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            format!("\"{}\" should match pattern \"{}\"", instance, pattern)
        }
        ValidationErrorKind::PropertyNames { error } => message_for(error),
        ValidationErrorKind::Constant { .. } => "should be equal to constant".to_string(),
        ValidationErrorKind::Enum { .. } => "should be equal to one of the allowed values".to_string(),
        ValidationErrorKind::AdditionalProperties { .. } => {
            "should NOT have additional properties".to_string()
        }
        _ => error.to_string(),
    }
}
