//! # Certificates
//!
//! Self-signed detection, certificate conflict checks over declarations, and
//! PKCS12 bundle import.

pub mod inspector;
mod legacy_pem;
mod pfx;
pub mod pkcs12;

pub use inspector::{CertificateConflict, CertificateInspector, SELF_SIGNED_CONFLICT};
pub use pkcs12::{parse_pkcs12, CertificateBundle, KeyFormat, Pkcs12Options};

/// Convenience wrapper over [`CertificateInspector::check_if_self_signed`].
pub fn check_if_self_signed(pem: &str) -> bool {
    CertificateInspector.check_if_self_signed(pem)
}
