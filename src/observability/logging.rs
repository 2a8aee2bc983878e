//! # Structured Logging
//!
//! Subscriber setup and span macros. Events never carry secret values; tag
//! processors log paths and kinds only.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LoggingConfig;
use crate::errors::{AdcError, Result};

/// Create a tracing span for a declaration digest.
///
/// ```rust,ignore
/// let span = digest_span!(context.request_id(), DeviceProfile::Primary);
/// let span = digest_span!(request_id, device, tenant = "Sample_01");
/// ```
#[macro_export]
macro_rules! digest_span {
    ($request_id:expr, $device:expr) => {
        tracing::info_span!(
            "digest",
            request_id = %$request_id,
            device = %$device
        )
    };
    ($request_id:expr, $device:expr, $($field:tt)*) => {
        tracing::info_span!(
            "digest",
            request_id = %$request_id,
            device = %$device,
            $($field)*
        )
    };
}

/// Create a tracing span for schema loading
#[macro_export]
macro_rules! schema_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "schema_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// A subscriber installed elsewhere (tests, host applications) is left alone.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AdcError::config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let installed = if config.json {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).json().finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).finish(),
        )
    };

    if installed.is_err() {
        tracing::debug!("global subscriber already set, keeping it");
    }
    Ok(())
}
