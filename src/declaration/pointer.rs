//! Structured pointers into a declaration tree.
//!
//! A [`DeclarationPath`] is an ordered list of object keys and array indices.
//! It renders as an RFC 6901 JSON pointer, with `/` standing for the root.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// One step of a [`DeclarationPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    /// The segment as it appears in a JSON pointer (unescaped).
    pub fn as_text(&self) -> String {
        match self {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Location of a node inside a declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeclarationPath {
    segments: Vec<PathSegment>,
}

impl DeclarationPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Parse a JSON pointer. Numeric segments become indices, which
    /// [`DeclarationPath::get`] still resolves as keys when the parent is an object.
    pub fn from_pointer(pointer: &str) -> Self {
        let segments = pointer
            .split('/')
            .skip(1)
            .filter(|raw| !raw.is_empty() || pointer != "/")
            .map(|raw| {
                let key = raw.replace("~1", "/").replace("~0", "~");
                match key.parse::<usize>() {
                    Ok(index) if key == index.to_string() => PathSegment::Index(index),
                    _ => PathSegment::Key(key),
                }
            })
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn parent(&self) -> Option<DeclarationPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self { segments: self.segments[..self.segments.len() - 1].to_vec() })
    }

    pub fn join(&self, segment: impl Into<PathSegment>) -> DeclarationPath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn starts_with(&self, other: &DeclarationPath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Resolve the path inside `root`.
    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |node, segment| step(node, segment))
    }

    /// Resolve the path inside `root` for mutation.
    pub fn get_mut<'v>(&self, root: &'v mut Value) -> Option<&'v mut Value> {
        let mut node = root;
        for segment in &self.segments {
            node = step_mut(node, segment)?;
        }
        Some(node)
    }

    /// Write `value` at this path. The parent must already exist; returns
    /// `false` when it does not or when the path is the root.
    pub fn set(&self, root: &mut Value, value: Value) -> bool {
        let (Some(parent), Some(last)) = (self.parent(), self.last()) else {
            return false;
        };
        match (parent.get_mut(root), last) {
            (Some(Value::Object(map)), segment) => {
                map.insert(segment.as_text(), value);
                true
            }
            (Some(Value::Array(items)), PathSegment::Index(index)) if *index < items.len() => {
                items[*index] = value;
                true
            }
            _ => false,
        }
    }
}

fn step<'v>(node: &'v Value, segment: &PathSegment) -> Option<&'v Value> {
    match (node, segment) {
        (Value::Object(map), segment) => map.get(&segment.as_text()),
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn step_mut<'v>(node: &'v mut Value, segment: &PathSegment) -> Option<&'v mut Value> {
    match (node, segment) {
        (Value::Object(map), segment) => map.get_mut(&segment.as_text()),
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

impl fmt::Display for DeclarationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment.as_text().replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

impl Serialize for DeclarationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
