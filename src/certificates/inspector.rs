//! X.509 checks run over declarations before they are applied.

use serde::Serialize;
use serde_json::Value;
use x509_parser::pem::parse_x509_pem;

use crate::declaration::DeclarationPath;

pub const SELF_SIGNED_CONFLICT: &str =
    "staplerOCSP or issuerCertificate cannot be used with a self-signed certificate";

/// Properties that only make sense for CA-issued certificates.
const ISSUER_DEPENDENT: &[&str] = &["staplerOCSP", "issuerCertificate"];

/// An advisory problem with a certificate item. Never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateConflict {
    pub path: DeclarationPath,
    pub message: String,
}

/// Stateless certificate checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CertificateInspector;

impl CertificateInspector {
    /// True when the first certificate in `pem` names itself as issuer and its
    /// signature verifies with its own public key. Unparsable input is not
    /// self-signed.
    pub fn check_if_self_signed(&self, pem: &str) -> bool {
        let Ok((_, pem)) = parse_x509_pem(pem.as_bytes()) else {
            return false;
        };
        let Ok(certificate) = pem.parse_x509() else {
            return false;
        };

        let tbs = &certificate.tbs_certificate;
        tbs.issuer.as_raw() == tbs.subject.as_raw() && certificate.verify_signature(None).is_ok()
    }

    /// One conflict per `Certificate` item that pairs a self-signed
    /// certificate with `staplerOCSP` or `issuerCertificate`. Items whose
    /// pointer is listed in `excluded_paths` are skipped.
    pub fn validate_certificates(
        &self,
        declaration: &Value,
        excluded_paths: &[String],
    ) -> Vec<CertificateConflict> {
        let mut conflicts = Vec::new();
        let mut stack = vec![(DeclarationPath::root(), declaration)];

        while let Some((path, node)) = stack.pop() {
            let Value::Object(map) = node else {
                continue;
            };

            if map.get("class").and_then(Value::as_str) == Some("Certificate") {
                let needs_issuer = ISSUER_DEPENDENT.iter().any(|key| map.contains_key(*key));
                let excluded = excluded_paths.iter().any(|excluded| *excluded == path.to_string());
                if needs_issuer && !excluded {
                    let self_signed = map
                        .get("certificate")
                        .and_then(Value::as_str)
                        .is_some_and(|pem| self.check_if_self_signed(pem));
                    if self_signed {
                        conflicts.push(CertificateConflict {
                            path: path.clone(),
                            message: SELF_SIGNED_CONFLICT.to_string(),
                        });
                    }
                }
                continue;
            }

            for (key, child) in map.iter().rev() {
                stack.push((path.join(key.as_str()), child));
            }
        }

        conflicts
    }
}
