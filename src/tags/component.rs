//! References to components that already exist on the target: `{bigip: "/Common/name"}`.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};

use super::{TagError, TagOccurrence, TagProcessor, TagResults, WriteBack};
use crate::declaration::DigestContext;

/// Lookup of existing components on the target.
#[async_trait]
pub trait ComponentCatalog: Send + Sync {
    /// Properties of the component at `path`, `None` when it does not exist.
    async fn lookup(&self, path: &str) -> Result<Option<Map<String, Value>>, String>;
}

/// A fixed set of components, keyed by absolute path.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    components: HashMap<String, Map<String, Value>>,
}

impl StaticCatalog {
    pub fn with_component(mut self, path: impl Into<String>, properties: Map<String, Value>) -> Self {
        self.components.insert(path.into(), properties);
        self
    }
}

#[async_trait]
impl ComponentCatalog for StaticCatalog {
    async fn lookup(&self, path: &str) -> Result<Option<Map<String, Value>>, String> {
        Ok(self.components.get(path).cloned())
    }
}

/// Processor for [`super::TagKind::BigComponent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BigComponentTagProcessor;

#[async_trait]
impl TagProcessor for BigComponentTagProcessor {
    async fn process(
        &self,
        context: &DigestContext,
        _declaration: &Value,
        occurrences: &[TagOccurrence],
    ) -> TagResults {
        let Some(catalog) = context.catalog() else {
            tracing::debug!(count = occurrences.len(), "no component catalog, skipping reference checks");
            return Vec::new();
        };

        join_all(occurrences.iter().map(|occurrence| resolve(catalog, occurrence))).await
    }
}

async fn resolve(
    catalog: &dyn ComponentCatalog,
    occurrence: &TagOccurrence,
) -> Result<WriteBack, TagError> {
    let reference = occurrence.data.get("bigip").and_then(Value::as_str).unwrap_or_default();

    let properties = catalog
        .lookup(reference)
        .await
        .map_err(|message| TagError::ComponentLookup { reference: reference.to_string(), message })?
        .ok_or_else(|| TagError::MissingComponent { reference: reference.to_string() })?;

    let mut expanded = Map::new();
    expanded.insert("bigip".to_string(), Value::String(reference.to_string()));
    for (key, value) in properties {
        expanded.entry(key).or_insert(value);
    }
    Ok(occurrence.replace_with(Value::Object(expanded)))
}
