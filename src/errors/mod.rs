//! # Error Handling
//!
//! Error types for declaration processing, defined with `thiserror`.
//! Certificate utilities have their own [`CertificateError`] which converts
//! into [`AdcError`] when it crosses the digest boundary.

pub mod certificate;

pub use certificate::CertificateError;

use crate::declaration::ValidationError;
use crate::tags::{TagError, TagKind};

/// Custom result type for declaration operations
pub type Result<T> = std::result::Result<T, AdcError>;

/// Main error type for schema loading and declaration digestion
#[derive(thiserror::Error, Debug)]
pub enum AdcError {
    /// Malformed call arguments
    #[error("{0}")]
    InvalidArgument(String),

    /// A schema source resolved to something without an `$id`
    #[error("loading schema {source_name} failed, error: {message}")]
    SchemaShape { source_name: String, message: String },

    /// A schema source could not be read, fetched or parsed
    #[error("loading schema {source_name} failed, error: {message}")]
    SchemaLoad { source_name: String, message: String },

    /// The schema compiler rejected the root schema
    #[error("compiling schema {id} failed, error: {message}")]
    SchemaCompile { id: String, message: String },

    /// The declaration does not conform to the schema (strict mode)
    #[error("{}", primary_message(.errors))]
    Validation { errors: Vec<ValidationError> },

    /// A tenant/application/item path is too long for the target
    #[error("The path {path} exceeds the 255 full path character limit")]
    PathLength { path: String },

    /// A tag processor rejected one of its occurrences
    #[error("{kind} processing failed: {source}")]
    TagProcessing {
        kind: TagKind,
        #[source]
        source: TagError,
    },

    /// Certificate inspection or PKCS12 import errors
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

fn primary_message(errors: &[ValidationError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "declaration is invalid".to_string())
}

impl AdcError {
    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a schema shape error for the named source
    pub fn schema_shape<S: Into<String>>(source_name: S) -> Self {
        Self::SchemaShape {
            source_name: source_name.into(),
            message: "schema must contain an $id property".to_string(),
        }
    }

    /// Create a schema load error for the named source
    pub fn schema_load<S: Into<String>, M: Into<String>>(source_name: S, message: M) -> Self {
        Self::SchemaLoad { source_name: source_name.into(), message: message.into() }
    }

    /// Validation errors carried by this error, if any.
    pub fn validation_errors(&self) -> Option<&[ValidationError]> {
        match self {
            AdcError::Validation { errors } => Some(errors),
            _ => None,
        }
    }
}
