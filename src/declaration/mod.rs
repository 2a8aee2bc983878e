//! # Declarations
//!
//! Everything that operates on a whole declaration: addressing nodes,
//! validation, path-length limits, credential redaction and the digest
//! pipeline that strings them together.

pub mod context;
pub mod parser;
pub mod path_length;
pub mod pointer;
pub mod profile;
pub mod redaction;
pub mod validator;

pub use context::DigestContext;
pub use parser::{AdcParser, DigestOptions, DigestOutcome};
pub use path_length::{validate_path_length, MAX_PATH_LENGTH};
pub use pointer::{DeclarationPath, PathSegment};
pub use profile::DeviceProfile;
pub use redaction::{CloudCredentialRedactor, REDACTED};
pub use validator::{check_identity, DeclarationValidator, ValidationError, ValidationReport};
