//! PKCS12 bundle import.
//!
//! Bundles arrive base64 encoded. Certificates come back as PEM, leaf first,
//! and the private key is re-armored in the format the declaration asks for.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pem::{EncodeConfig, LineEnding, Pem};
use pkcs8::{ObjectIdentifier, PrivateKeyInfo};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::legacy_pem;
use super::pfx::decode_pfx;
use crate::errors::CertificateError;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// How an imported private key is armored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyFormat {
    /// Traditional `RSA PRIVATE KEY` PEM, DEK-Info encrypted when a password is set.
    #[default]
    OpensslLegacy,
    /// `ENCRYPTED PRIVATE KEY` (PKCS#8 with PBES2) when a password is set.
    Pkcs8,
    /// Unencrypted `PRIVATE KEY` regardless of password.
    Pkcs8Plain,
}

impl KeyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormat::OpensslLegacy => "openssl-legacy",
            KeyFormat::Pkcs8 => "pkcs8",
            KeyFormat::Pkcs8Plain => "pkcs8-plain",
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openssl-legacy" => Ok(KeyFormat::OpensslLegacy),
            "pkcs8" => Ok(KeyFormat::Pkcs8),
            "pkcs8-plain" => Ok(KeyFormat::Pkcs8Plain),
            other => Err(format!("unknown key import format '{}'", other)),
        }
    }
}

/// Import options. The password both unlocks the bundle and protects the
/// exported key.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Pkcs12Options {
    #[zeroize(skip)]
    pub key_format: KeyFormat,
    pub import_password: Option<String>,
}

impl Pkcs12Options {
    pub fn new(key_format: KeyFormat) -> Self {
        Self { key_format, import_password: None }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.import_password = Some(password.into());
        self
    }

    fn password(&self) -> &str {
        self.import_password.as_deref().unwrap_or("")
    }
}

impl fmt::Debug for Pkcs12Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkcs12Options")
            .field("key_format", &self.key_format)
            .field("import_password", &self.import_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// The PEM contents of a PKCS12 bundle.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CertificateBundle {
    /// Leaf first, then the rest of the chain.
    pub certificates: Vec<String>,
    pub private_key: Option<String>,
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificates", &self.certificates.len())
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Decode a base64 PKCS12 bundle into PEM certificates and an optional key.
pub fn parse_pkcs12(
    encoded: &str,
    options: &Pkcs12Options,
) -> Result<CertificateBundle, CertificateError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let der = Zeroizing::new(
        STANDARD
            .decode(compact)
            .map_err(|e| CertificateError::Pkcs12Decode(format!("bundle is not valid base64: {}", e)))?,
    );

    let contents = decode_pfx(&der, options.password())?;
    let certificates = order_leaf_first(contents.certificates);
    let key = contents.private_key;

    tracing::debug!(
        certificates = certificates.len(),
        has_private_key = key.is_some(),
        key_format = %options.key_format,
        "decoded PKCS12 bundle"
    );

    let private_key = key
        .map(|key| export_private_key(&key, options.key_format, options.password()))
        .transpose()?;

    Ok(CertificateBundle {
        certificates: certificates.iter().map(|der| encode_pem("CERTIFICATE", der)).collect(),
        private_key,
    })
}

/// 64-column LF PEM with a trailing newline.
pub(crate) fn encode_pem(label: &str, der: &[u8]) -> String {
    pem::encode_config(
        &Pem::new(label, der.to_vec()),
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    )
}

fn export_private_key(
    pkcs8_der: &[u8],
    format: KeyFormat,
    password: &str,
) -> Result<String, CertificateError> {
    let info = PrivateKeyInfo::try_from(pkcs8_der)
        .map_err(|e| CertificateError::InvalidPrivateKey(e.to_string()))?;

    if format == KeyFormat::Pkcs8Plain {
        return Ok(encode_pem("PRIVATE KEY", pkcs8_der));
    }

    // Without a password neither format can encrypt; fall back to the
    // unencrypted traditional armor.
    if password.is_empty() {
        let (label, der) = traditional_parts(&info, pkcs8_der);
        return Ok(encode_pem(label, der));
    }

    match format {
        KeyFormat::Pkcs8 => {
            let document = info
                .encrypt(OsRng, password.as_bytes())
                .map_err(|e| CertificateError::KeyEncryption(e.to_string()))?;
            let armored = document
                .to_pem("ENCRYPTED PRIVATE KEY", pkcs8::LineEnding::LF)
                .map_err(|e| CertificateError::KeyEncryption(e.to_string()))?;
            Ok(armored.to_string())
        }
        _ => {
            let (label, der) = traditional_parts(&info, pkcs8_der);
            legacy_pem::encrypt(label, der, password)
        }
    }
}

/// The inner key and its traditional PEM label. Algorithms without a
/// traditional form keep their PKCS#8 encoding.
fn traditional_parts<'a>(info: &PrivateKeyInfo<'a>, pkcs8_der: &'a [u8]) -> (&'static str, &'a [u8]) {
    if info.algorithm.oid == RSA_ENCRYPTION {
        ("RSA PRIVATE KEY", info.private_key)
    } else if info.algorithm.oid == EC_PUBLIC_KEY {
        ("EC PRIVATE KEY", info.private_key)
    } else {
        ("PRIVATE KEY", pkcs8_der)
    }
}

/// Put the certificate nobody else names as issuer first, then follow issuer
/// links. Anything left over keeps its bundle order.
fn order_leaf_first(certificates: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    use x509_parser::prelude::{FromDer, X509Certificate};

    let names: Vec<Option<(Vec<u8>, Vec<u8>)>> = certificates
        .iter()
        .map(|der| {
            X509Certificate::from_der(der).ok().map(|(_, cert)| {
                (cert.tbs_certificate.subject.as_raw().to_vec(), cert.tbs_certificate.issuer.as_raw().to_vec())
            })
        })
        .collect();

    let issued_by_other = |index: usize| {
        let Some((subject, _)) = &names[index] else {
            return false;
        };
        names.iter().enumerate().any(|(other, entry)| {
            other != index
                && entry.as_ref().is_some_and(|(other_subject, issuer)| issuer == subject && other_subject != subject)
        })
    };

    let mut remaining: Vec<usize> = (0..certificates.len()).collect();
    let mut ordered = Vec::with_capacity(certificates.len());

    let mut next = remaining.iter().position(|&index| !issued_by_other(index));
    while let Some(position) = next {
        let index = remaining.remove(position);
        ordered.push(index);
        next = names[index].as_ref().and_then(|(subject, issuer)| {
            if subject == issuer {
                return None;
            }
            remaining
                .iter()
                .position(|&candidate| names[candidate].as_ref().is_some_and(|(s, _)| s == issuer))
        });
    }
    ordered.extend(remaining);

    let mut slots: Vec<Option<Vec<u8>>> = certificates.into_iter().map(Some).collect();
    ordered.into_iter().filter_map(|index| slots[index].take()).collect()
}
