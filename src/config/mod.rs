//! # Configuration Management
//!
//! Parser configuration read from `ADC_PARSER_*` environment variables and
//! checked with `validator`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::declaration::DeviceProfile;
use crate::errors::{AdcError, Result};
use crate::schema::SchemaSource;

const ENV_PREFIX: &str = "ADC_PARSER_";

/// Configuration for building an [`AdcParser`](crate::declaration::AdcParser)
/// and its digest contexts.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ParserConfig {
    /// Target device class
    pub device: DeviceProfile,

    /// Fail digests on schema errors instead of reporting them
    pub strict_validation: bool,

    /// Timeout for schema and resource fetches
    #[validate(range(
        min = 1,
        max = 300,
        message = "Fetch timeout must be between 1 and 300 seconds"
    ))]
    pub fetch_timeout_seconds: u64,

    /// Schema URLs or paths; the built-in schema is used when empty
    pub schema_sources: Vec<String>,

    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            device: DeviceProfile::Primary,
            strict_validation: true,
            fetch_timeout_seconds: 30,
            schema_sources: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl ParserConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup. Keys carry the
    /// `ADC_PARSER_` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let defaults = Self::default();

        let device = match var("DEVICE") {
            Some(value) => value.parse().map_err(AdcError::config)?,
            None => defaults.device,
        };

        let strict_validation = var("STRICT_VALIDATION")
            .map(|s| parse_bool(&s))
            .unwrap_or(defaults.strict_validation);

        let fetch_timeout_seconds = match var("FETCH_TIMEOUT_SECONDS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|e| AdcError::config(format!("Invalid fetch timeout: {}", e)))?,
            None => defaults.fetch_timeout_seconds,
        };

        let schema_sources = var("SCHEMA_SOURCES")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let logging = LoggingConfig {
            level: var("LOG_LEVEL").unwrap_or(defaults.logging.level.clone()),
            json: var("LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(defaults.logging.json),
        };

        let config = Self { device, strict_validation, fetch_timeout_seconds, schema_sources, logging };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(|errors| {
            let message = errors
                .field_errors()
                .iter()
                .map(|(field, field_errors)| {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                        .collect();
                    format!("{}: {}", field, messages.join(", "))
                })
                .chain(errors.errors().iter().filter_map(|(field, kind)| match kind {
                    validator::ValidationErrorsKind::Struct(nested) => Some(format!("{}: {}", field, nested)),
                    _ => None,
                }))
                .collect::<Vec<_>>()
                .join("; ");
            AdcError::config(format!("Validation failed: {}", message))
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// Configured schema sources, or `None` to use the built-in schema
    pub fn schema_sources(&self) -> Option<Vec<SchemaSource>> {
        if self.schema_sources.is_empty() {
            None
        } else {
            Some(self.schema_sources.iter().map(|s| SchemaSource::parse(s)).collect())
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
