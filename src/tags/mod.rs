//! # Tags
//!
//! Tags are declaration fragments whose shape asks for extra work before the
//! declaration can be applied: secrets to encrypt for the device, remote
//! documents to inline, component references to check on the target.
//!
//! The [`walker`] discovers every occurrence in one pass, hands each kind to
//! the [`TagProcessor`] registered for it and applies the resulting
//! [`WriteBack`]s to the declaration.

pub mod component;
pub mod fetch;
pub mod long_secret;
pub mod secret;
pub mod walker;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::declaration::{DeclarationPath, DigestContext, PathSegment};

pub use component::{BigComponentTagProcessor, ComponentCatalog, StaticCatalog};
pub use fetch::{FetchAuthentication, FetchRequest, FetchTagProcessor, Fetcher, HttpFetcher};
pub use long_secret::LongSecretTagProcessor;
pub use secret::{SecretEncryptor, SecretTagProcessor};
pub use walker::{DiscoveredTags, TagSummary, TagWalker};

/// The closed set of tag shapes recognised in a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    Secret,
    LongSecret,
    Fetch,
    BigComponent,
}

impl TagKind {
    /// Dispatch order; the first failing kind in this order is reported.
    pub const ALL: [TagKind; 4] =
        [TagKind::Secret, TagKind::LongSecret, TagKind::Fetch, TagKind::BigComponent];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Secret => "SecretTag",
            TagKind::LongSecret => "LongSecretTag",
            TagKind::Fetch => "FetchTag",
            TagKind::BigComponent => "BigComponentTag",
        }
    }

    /// Kinds whose resolved values are mirrored into the base declaration.
    pub fn is_secret(&self) -> bool {
        matches!(self, TagKind::Secret | TagKind::LongSecret)
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tagged value found during discovery.
///
/// `data` is a snapshot taken at discovery time; the live value sits at
/// `parent[property]`, which is also `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct TagOccurrence {
    pub kind: TagKind,
    pub parent: DeclarationPath,
    pub property: PathSegment,
    pub data: Value,
    pub path: DeclarationPath,
}

impl TagOccurrence {
    pub fn new(kind: TagKind, parent: DeclarationPath, property: PathSegment, data: Value) -> Self {
        let path = parent.join(property.clone());
        Self { kind, parent, property, data, path }
    }

    /// A write-back replacing this occurrence's value.
    pub fn replace_with(&self, value: Value) -> WriteBack {
        WriteBack { target: self.path.clone(), value }
    }
}

/// A mutation requested by a processor.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBack {
    pub target: DeclarationPath,
    pub value: Value,
}

/// Errors raised by tag processors.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    /// A secret payload could not be decoded.
    #[error("invalid secret at {path}: {message}")]
    InvalidSecret { path: DeclarationPath, message: String },

    /// The device encryption capability failed or is missing.
    #[error("unable to encrypt secret at {path}: {message}")]
    Encryption { path: DeclarationPath, message: String },

    /// A remote document could not be retrieved.
    #[error("unable to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// A component reference does not resolve on the target.
    #[error("component {reference} does not exist on the target")]
    MissingComponent { reference: String },

    /// The component catalog itself failed.
    #[error("component lookup for {reference} failed: {message}")]
    ComponentLookup { reference: String, message: String },
}

/// Outcome of one processor call: a write-back for each resolved occurrence
/// and an error for each failed one, in occurrence order. Occurrences that
/// need no change contribute nothing.
pub type TagResults = Vec<Result<WriteBack, TagError>>;

/// Resolves every occurrence of one tag kind.
///
/// Implementations receive a read-only view of the declaration and describe
/// their changes as write-backs; they never mutate the tree directly. A
/// failing occurrence does not affect its siblings.
#[async_trait]
pub trait TagProcessor: Send + Sync {
    async fn process(
        &self,
        context: &DigestContext,
        declaration: &Value,
        occurrences: &[TagOccurrence],
    ) -> TagResults;
}

/// Drop the no-op entries of per-occurrence results.
pub(crate) fn collect_results(results: Vec<Result<Option<WriteBack>, TagError>>) -> TagResults {
    results.into_iter().filter_map(Result::transpose).collect()
}

/// Maps each [`TagKind`] to its processor.
#[derive(Clone)]
pub struct ProcessorRegistry {
    secret: Arc<dyn TagProcessor>,
    long_secret: Arc<dyn TagProcessor>,
    fetch: Arc<dyn TagProcessor>,
    big_component: Arc<dyn TagProcessor>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self {
            secret: Arc::new(SecretTagProcessor),
            long_secret: Arc::new(LongSecretTagProcessor),
            fetch: Arc::new(FetchTagProcessor),
            big_component: Arc::new(BigComponentTagProcessor),
        }
    }
}

impl ProcessorRegistry {
    /// Replace the processor for `kind`.
    pub fn with_processor(mut self, kind: TagKind, processor: Arc<dyn TagProcessor>) -> Self {
        match kind {
            TagKind::Secret => self.secret = processor,
            TagKind::LongSecret => self.long_secret = processor,
            TagKind::Fetch => self.fetch = processor,
            TagKind::BigComponent => self.big_component = processor,
        }
        self
    }

    pub fn get(&self, kind: TagKind) -> &Arc<dyn TagProcessor> {
        match kind {
            TagKind::Secret => &self.secret,
            TagKind::LongSecret => &self.long_secret,
            TagKind::Fetch => &self.fetch,
            TagKind::BigComponent => &self.big_component,
        }
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry").finish_non_exhaustive()
    }
}

/// All write-backs, or the first error.
#[cfg(test)]
pub(crate) fn into_writes(results: TagResults) -> Result<Vec<WriteBack>, TagError> {
    results.into_iter().collect()
}
