//! # Observability
//!
//! Structured logging for schema loading and declaration digests.

pub mod logging;

pub use logging::init_logging;
