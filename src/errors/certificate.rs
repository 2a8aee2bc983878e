use thiserror::Error;

/// Certificate-specific error variants surfaced while importing bundles.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The bundle is not base64, is malformed, or does not open with the
    /// supplied password.
    #[error("unable to decode PKCS12 bundle: {0}")]
    Pkcs12Decode(String),

    /// The bundle decoded but its private key is not a usable PKCS8 structure.
    #[error("PKCS12 private key is not a supported PKCS8 key: {0}")]
    InvalidPrivateKey(String),

    /// Re-encrypting the private key in the requested format failed.
    #[error("failed to encrypt private key: {0}")]
    KeyEncryption(String),
}
