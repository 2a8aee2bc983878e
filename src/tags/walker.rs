//! Tag discovery and resolution.

use std::collections::BTreeMap;

use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::{ProcessorRegistry, TagKind, TagOccurrence, WriteBack};
use crate::declaration::{DeclarationPath, DigestContext, PathSegment};
use crate::errors::{AdcError, Result};

lazy_static! {
    /// Absolute component path on the target: `/Partition[/Folder]/name`.
    pub(crate) static ref COMPONENT_PATH_REGEX: Regex = Regex::new(r"^/[^/\s]+(/[^/\s]+){1,2}$")
        .expect("COMPONENT_PATH_REGEX should be a valid regex pattern");
}

const FETCH_KEYS: &[&str] = &["url", "ignoreChanges"];
const RESOURCE_KEYS: &[&str] = &["url", "authentication", "skipCertificateCheck"];

/// Occurrences grouped by kind, in document order within a kind.
#[derive(Debug, Default, Clone)]
pub struct DiscoveredTags {
    by_kind: BTreeMap<TagKind, Vec<TagOccurrence>>,
}

impl DiscoveredTags {
    pub fn of(&self, kind: TagKind) -> &[TagOccurrence] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn push(&mut self, occurrence: TagOccurrence) {
        self.by_kind.entry(occurrence.kind).or_default().push(occurrence);
    }
}

/// Counts reported after a resolution pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TagSummary {
    pub discovered: usize,
    pub applied: usize,
}

/// Walks a declaration, dispatches tag occurrences and applies write-backs.
pub struct TagWalker<'p> {
    processors: &'p ProcessorRegistry,
}

impl<'p> TagWalker<'p> {
    pub fn new(processors: &'p ProcessorRegistry) -> Self {
        Self { processors }
    }

    /// Discover every tag occurrence without touching the declaration.
    pub fn discover(declaration: &Value) -> DiscoveredTags {
        let mut found = DiscoveredTags::default();
        let mut stack: Vec<(DeclarationPath, &Value, bool)> =
            vec![(DeclarationPath::root(), declaration, false)];

        while let Some((path, node, parent_matched)) = stack.pop() {
            let mut matched = false;
            if !parent_matched && !path.is_root() {
                if let Some(occurrence) = classify(&path, node) {
                    found.push(occurrence);
                    matched = true;
                }
            }

            match node {
                Value::Object(map) => {
                    for (key, child) in map.iter().rev() {
                        stack.push((path.join(key.as_str()), child, matched));
                    }
                }
                Value::Array(items) => {
                    for (index, child) in items.iter().enumerate().rev() {
                        stack.push((path.join(index), child, matched));
                    }
                }
                _ => {}
            }
        }

        found
    }

    /// Resolve all tags in `declaration`.
    ///
    /// Each kind is dispatched once, concurrently with the others. Every
    /// successful write-back is applied, deepest first, even when a sibling
    /// occurrence failed; the first failure (in kind order, then occurrence
    /// order) is returned afterwards. When `base` is given, secret
    /// write-backs are mirrored into it wherever their parent exists.
    pub async fn resolve(
        &self,
        context: &DigestContext,
        declaration: &mut Value,
        mut base: Option<&mut Value>,
    ) -> Result<TagSummary> {
        let discovered = Self::discover(declaration);
        let mut summary = TagSummary { discovered: discovered.total(), applied: 0 };
        if discovered.is_empty() {
            return Ok(summary);
        }

        let results = {
            let snapshot: &Value = declaration;
            let dispatch = TagKind::ALL.into_iter().filter_map(|kind| {
                let occurrences = discovered.of(kind);
                if occurrences.is_empty() {
                    return None;
                }
                let processor = self.processors.get(kind);
                tracing::debug!(kind = %kind, count = occurrences.len(), "dispatching tag occurrences");
                Some(async move { (kind, processor.process(context, snapshot, occurrences).await) })
            });
            join_all(dispatch).await
        };

        let mut writes: Vec<(TagKind, WriteBack)> = Vec::new();
        let mut failure = None;
        for (kind, kind_results) in results {
            for result in kind_results {
                match result {
                    Ok(write) => writes.push((kind, write)),
                    Err(source) => {
                        tracing::error!(kind = %kind, error = %source, "tag processing failed");
                        if failure.is_none() {
                            failure = Some(AdcError::TagProcessing { kind, source });
                        }
                    }
                }
            }
        }

        writes.sort_by(|(_, a), (_, b)| b.target.depth().cmp(&a.target.depth()));
        for (kind, write) in writes {
            if let Some(base) = base.as_deref_mut().filter(|_| kind.is_secret()) {
                if write.target.set(base, write.value.clone()) {
                    tracing::debug!(path = %write.target, "copied resolved secret to base declaration");
                }
            }
            if write.target.set(declaration, write.value) {
                summary.applied += 1;
            } else {
                tracing::warn!(kind = %kind, path = %write.target, "write-back target no longer exists");
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(summary),
        }
    }
}

fn classify(path: &DeclarationPath, node: &Value) -> Option<TagOccurrence> {
    let Value::Object(map) = node else {
        return None;
    };

    let kind = if is_secret(map) {
        TagKind::Secret
    } else if is_component_reference(map) {
        TagKind::BigComponent
    } else if is_fetch_reference(map) {
        TagKind::Fetch
    } else if let Some(field) = credential_field(map) {
        return Some(TagOccurrence::new(
            TagKind::LongSecret,
            path.clone(),
            PathSegment::from(field),
            map[field].clone(),
        ));
    } else {
        return None;
    };

    let parent = path.parent()?;
    let property = path.last()?.clone();
    Some(TagOccurrence::new(kind, parent, property, node.clone()))
}

fn is_secret(map: &Map<String, Value>) -> bool {
    map.get("ciphertext").is_some_and(Value::is_string)
        && map.get("protected").is_some_and(Value::is_string)
}

fn is_component_reference(map: &Map<String, Value>) -> bool {
    map.len() == 1
        && map
            .get("bigip")
            .and_then(Value::as_str)
            .is_some_and(|reference| COMPONENT_PATH_REGEX.is_match(reference))
}

fn is_fetch_reference(map: &Map<String, Value>) -> bool {
    if !map.keys().all(|key| FETCH_KEYS.contains(&key.as_str())) {
        return false;
    }
    match map.get("url") {
        Some(Value::String(url)) => is_remote_url(url),
        Some(Value::Object(resource)) => {
            resource.keys().all(|key| RESOURCE_KEYS.contains(&key.as_str()))
                && resource.get("url").and_then(Value::as_str).is_some_and(is_remote_url)
        }
        _ => false,
    }
}

/// The credential property of an authentication block, when it holds a plain string.
fn credential_field(map: &Map<String, Value>) -> Option<&'static str> {
    let field = match map.get("method").and_then(Value::as_str)? {
        "bearer-token" => "token",
        "basic" => "password",
        _ => return None,
    };
    map.get(field).is_some_and(Value::is_string).then_some(field)
}

pub(crate) fn is_remote_url(candidate: &str) -> bool {
    url::Url::parse(candidate).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
