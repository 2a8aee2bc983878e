//! Schema-driven default expansion.
//!
//! Walks the root schema alongside a declaration and fills in every absent
//! property that declares a `default`. Only the keywords that shape object
//! structure are followed: `properties`, `additionalProperties`, `items`,
//! `$ref`, `allOf` and `if`/`then`/`else`.

use std::collections::HashMap;

use jsonschema::{Draft, Validator};
use serde_json::Value;

use super::SchemaRegistry;
use crate::declaration::DeclarationPath;

/// Longest `$ref` chain followed without descending into the declaration.
/// The count restarts at every child node, so only cycles are cut off.
const MAX_REF_HOPS: u8 = 32;

struct Frame<'r> {
    schema: &'r Value,
    document: &'r str,
    path: DeclarationPath,
    hops: u8,
}

/// Inserts schema defaults into declarations.
pub struct DefaultExpander<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> DefaultExpander<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Expand defaults in place and return how many properties were added.
    pub fn expand(&self, declaration: &mut Value) -> usize {
        let Some((root_id, root_schema)) = self.registry.root_id().and_then(|id| self.registry.entry(id))
        else {
            tracing::warn!("no root schema loaded, skipping default expansion");
            return 0;
        };

        let mut conditions: HashMap<*const Value, Option<Validator>> = HashMap::new();
        let mut applied = 0;
        let mut stack = vec![Frame {
            schema: root_schema,
            document: root_id,
            path: DeclarationPath::root(),
            hops: 0,
        }];

        while let Some(frame) = stack.pop() {
            let Value::Object(keywords) = frame.schema else {
                continue;
            };

            if let Some(reference) = keywords.get("$ref").and_then(Value::as_str) {
                if frame.hops >= MAX_REF_HOPS {
                    tracing::warn!(reference, path = %frame.path, "too many schema references, stopping");
                    continue;
                }
                match self.resolve(frame.document, reference) {
                    Some((document, schema)) => stack.push(Frame {
                        schema,
                        document,
                        path: frame.path,
                        hops: frame.hops + 1,
                    }),
                    None => tracing::debug!(reference, "unresolved schema reference"),
                }
                continue;
            }

            let Some(node) = frame.path.get_mut(declaration) else {
                continue;
            };

            let same_node = |schema: &'r Value| Frame {
                schema,
                document: frame.document,
                path: frame.path.clone(),
                hops: frame.hops,
            };

            if let Some(condition) = keywords.get("if") {
                let validator = conditions.entry(condition as *const Value).or_insert_with(|| {
                    Validator::options().with_draft(Draft::Draft7).build(condition).ok()
                });
                let holds = validator.as_ref().is_some_and(|v| v.is_valid(node));
                if let Some(branch) = keywords.get(if holds { "then" } else { "else" }) {
                    stack.push(same_node(branch));
                }
            }

            if let Some(Value::Array(all_of)) = keywords.get("allOf") {
                stack.extend(all_of.iter().map(same_node));
            }

            match node {
                Value::Object(map) => {
                    let properties = keywords.get("properties").and_then(Value::as_object);
                    if let Some(properties) = properties {
                        for (name, schema) in properties {
                            if !map.contains_key(name) {
                                if let Some(default) = schema.get("default") {
                                    map.insert(name.clone(), default.clone());
                                    applied += 1;
                                }
                            }
                            if map.contains_key(name) {
                                stack.push(Frame {
                                    schema,
                                    document: frame.document,
                                    path: frame.path.join(name.as_str()),
                                    hops: 0,
                                });
                            }
                        }
                    }

                    if let Some(additional) = keywords.get("additionalProperties").filter(|s| s.is_object()) {
                        let declared = |key: &String| properties.is_some_and(|p| p.contains_key(key));
                        for key in map.keys().filter(|key| !declared(*key)) {
                            stack.push(Frame {
                                schema: additional,
                                document: frame.document,
                                path: frame.path.join(key.as_str()),
                                hops: 0,
                            });
                        }
                    }
                }
                Value::Array(items) => match keywords.get("items") {
                    Some(schema @ Value::Object(_)) => {
                        for index in 0..items.len() {
                            stack.push(Frame {
                                schema,
                                document: frame.document,
                                path: frame.path.join(index),
                                hops: 0,
                            });
                        }
                    }
                    Some(Value::Array(tuple)) => {
                        for (index, schema) in tuple.iter().enumerate().take(items.len()) {
                            stack.push(Frame {
                                schema,
                                document: frame.document,
                                path: frame.path.join(index),
                                hops: 0,
                            });
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        tracing::debug!(defaults_applied = applied, "expanded schema defaults");
        applied
    }

    /// Resolve `reference` relative to the document it appears in.
    fn resolve(&self, document: &'r str, reference: &str) -> Option<(&'r str, &'r Value)> {
        let (base, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let (id, schema) = if base.is_empty() {
            self.registry.entry(document)?
        } else {
            self.registry.entry(base)?
        };
        let target = if fragment.is_empty() { schema } else { schema.pointer(fragment)? };
        Some((id, target))
    }
}
