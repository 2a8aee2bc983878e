//! # ADC Declaration
//!
//! Validation, tag resolution and certificate handling for ADC declarations:
//! JSON documents that describe tenants, applications and their services for
//! an application delivery controller.
//!
//! ## Architecture
//!
//! A digest runs a declaration through a fixed pipeline:
//!
//! ```text
//! identity + schema validation → path length → certificate checks
//!     → tag resolution → default expansion → credential redaction
//! ```
//!
//! - **Schemas**: [`SchemaRegistry`] loads JSON-Schema documents from inline
//!   JSON, URLs or files and compiles the last one as the root.
//! - **Tags**: [`tags::TagWalker`] finds secrets, long secrets, remote
//!   references and component pointers, and hands each kind to its
//!   [`tags::TagProcessor`].
//! - **Certificates**: self-signed detection and PKCS12 import.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use adc_declaration::{AdcParser, DeviceProfile, DigestContext, DigestOptions, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let parser = AdcParser::new(DeviceProfile::Primary)?;
//!     let mut declaration = json!({
//!         "class": "ADC",
//!         "schemaVersion": "3.0.0",
//!         "id": "decl",
//!         "tenant": {
//!             "class": "Tenant",
//!             "app": {
//!                 "class": "Application",
//!                 "template": "http",
//!                 "serviceMain": {
//!                     "class": "Service_HTTP",
//!                     "virtualAddresses": ["198.51.100.10"]
//!                 }
//!             }
//!         }
//!     });
//!     let outcome = parser
//!         .digest(&DigestContext::new(), &mut declaration, DigestOptions::default())
//!         .await?;
//!     println!("applied {} defaults", outcome.defaults_applied);
//!     Ok(())
//! }
//! ```

pub mod certificates;
pub mod config;
pub mod declaration;
pub mod errors;
pub mod observability;
pub mod schema;
pub mod tags;

// Re-export commonly used types and traits
pub use certificates::{check_if_self_signed, parse_pkcs12, CertificateConflict, CertificateInspector};
pub use config::ParserConfig;
pub use declaration::{AdcParser, DeviceProfile, DigestContext, DigestOptions, DigestOutcome};
pub use errors::{AdcError, Result};
pub use observability::init_logging;
pub use schema::{SchemaRegistry, SchemaSource};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
