//! The digest pipeline.
//!
//! A digest takes a candidate declaration through, in order: option checks,
//! identity and schema validation, path-length validation, certificate
//! inspection, tag resolution, default expansion and credential redaction.
//! Redaction runs whatever happened before it.

use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use super::context::DigestContext;
use super::path_length;
use super::profile::DeviceProfile;
use super::redaction::CloudCredentialRedactor;
use super::validator::{DeclarationValidator, ValidationError};
use crate::certificates::{CertificateConflict, CertificateInspector};
use crate::config::ParserConfig;
use crate::errors::{AdcError, Result};
use crate::schema::{DefaultExpander, SchemaRegistry, SchemaSource};
use crate::tags::{ProcessorRegistry, TagWalker};

/// Per-call digest options.
#[derive(Debug, Default)]
pub struct DigestOptions<'a> {
    /// Mirror resolved secrets into `base_declaration`.
    pub copy_secrets: bool,
    pub base_declaration: Option<&'a mut Value>,
    /// Overrides the parser's device profile for this call.
    pub target_device: Option<DeviceProfile>,
}

/// What a digest found and changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DigestOutcome {
    /// Non-empty only for non-strict digests of invalid declarations.
    pub validation_errors: Vec<ValidationError>,
    pub certificate_conflicts: Vec<CertificateConflict>,
    pub tags_resolved: usize,
    pub defaults_applied: usize,
    pub redacted_fields: usize,
}

impl DigestOutcome {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }
}

/// Validates and transforms declarations for one device profile.
#[derive(Debug)]
pub struct AdcParser {
    device: DeviceProfile,
    registry: SchemaRegistry,
    processors: ProcessorRegistry,
}

impl AdcParser {
    /// Parser with the built-in schema loaded.
    pub fn new(device: DeviceProfile) -> Result<Self> {
        let mut registry = SchemaRegistry::default();
        registry.load_default()?;
        Ok(Self { device, registry, processors: ProcessorRegistry::default() })
    }

    /// Parser for the configured device, loading the configured schema sources.
    pub async fn from_config(config: &ParserConfig) -> Result<Self> {
        let mut registry = SchemaRegistry::new(config.fetch_timeout());
        registry.load_schemas(config.schema_sources()).await?;
        Ok(Self { device: config.device, registry, processors: ProcessorRegistry::default() })
    }

    /// Replace the tag processors.
    pub fn with_processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    pub fn device(&self) -> DeviceProfile {
        self.device
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Load schemas into the registry; see [`SchemaRegistry::load_schemas`].
    pub async fn load_schemas(&mut self, sources: Option<Vec<SchemaSource>>) -> Result<Vec<String>> {
        self.registry.load_schemas(sources).await
    }

    /// Standalone path-length validation.
    pub fn validate_path_length(&self, declaration: &Value) -> Result<()> {
        path_length::validate_path_length(declaration)
    }

    /// Validate and transform `declaration` in place.
    pub async fn digest(
        &self,
        context: &DigestContext,
        declaration: &mut Value,
        options: DigestOptions<'_>,
    ) -> Result<DigestOutcome> {
        let device = options.target_device.unwrap_or(self.device);
        let context = context.clone().with_device(device);
        let copy_to_base = device.should_copy_secrets_to_base(&options);
        let missing_base = options.copy_secrets && options.base_declaration.is_none();
        let mut base = options.base_declaration;

        let span = crate::digest_span!(context.request_id(), device);
        async move {
            let result = if missing_base {
                Err(AdcError::invalid_argument("copySecrets requires a base declaration"))
            } else {
                let mirror = if copy_to_base { base.as_deref_mut() } else { None };
                self.run_stages(&context, declaration, mirror).await
            };

            let redactor = CloudCredentialRedactor;
            let mut redacted = redactor.redact(declaration);
            if let Some(base) = base {
                redacted += redactor.redact(base);
            }

            match result {
                Ok(outcome) => {
                    tracing::info!(
                        tags_resolved = outcome.tags_resolved,
                        defaults_applied = outcome.defaults_applied,
                        redacted_fields = redacted,
                        "declaration digested"
                    );
                    Ok(DigestOutcome { redacted_fields: redacted, ..outcome })
                }
                Err(error) => {
                    tracing::error!(error = %error, "declaration digest failed");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        context: &DigestContext,
        declaration: &mut Value,
        base: Option<&mut Value>,
    ) -> Result<DigestOutcome> {
        let device = context.device();

        let report = DeclarationValidator::new(&self.registry).validate(declaration, device);
        if let Some(primary) = report.primary() {
            if context.strict_validation() {
                return Err(AdcError::Validation { errors: report.errors });
            }
            tracing::warn!(
                error_count = report.errors.len(),
                path = %primary.path,
                message = %primary.message,
                "declaration is invalid, skipping processing"
            );
            return Ok(DigestOutcome { validation_errors: report.errors, ..Default::default() });
        }

        path_length::validate_path_length(declaration)?;

        let certificate_conflicts = CertificateInspector.validate_certificates(declaration, &[]);
        for conflict in &certificate_conflicts {
            tracing::warn!(path = %conflict.path, "{}", conflict.message);
        }

        let tags = TagWalker::new(&self.processors).resolve(context, declaration, base).await?;

        let defaults_applied = if device.should_expand_defaults() {
            DefaultExpander::new(&self.registry).expand(declaration)
        } else {
            0
        };

        Ok(DigestOutcome {
            validation_errors: Vec::new(),
            certificate_conflicts,
            tags_resolved: tags.applied,
            defaults_applied,
            redacted_fields: 0,
        })
    }
}
