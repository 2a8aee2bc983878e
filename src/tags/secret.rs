//! Secret payloads: `{ciphertext, protected}` objects with a JOSE header.
//!
//! A payload whose header says `enc: none` carries base64 plaintext and is
//! encrypted for the device. A payload already marked `enc: f5sv` holds device
//! ciphertext and is left alone.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use futures::future::join_all;
use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::{collect_results, TagError, TagOccurrence, TagProcessor, TagResults, WriteBack};
use crate::declaration::{DeclarationPath, DigestContext};

/// `enc` value of payloads already encrypted for the device.
pub const DEVICE_ENCRYPTION: &str = "f5sv";

/// `enc` value of payloads carrying base64 plaintext.
pub const NO_ENCRYPTION: &str = "none";

/// Device-side secret encryption.
///
/// Implementations MUST NOT log the plaintext.
#[async_trait]
pub trait SecretEncryptor: Send + Sync {
    /// Encrypt `plaintext` and return the device ciphertext.
    async fn encrypt(&self, plaintext: &[u8]) -> Result<String, String>;
}

/// Processor for [`super::TagKind::Secret`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretTagProcessor;

#[async_trait]
impl TagProcessor for SecretTagProcessor {
    async fn process(
        &self,
        context: &DigestContext,
        _declaration: &Value,
        occurrences: &[TagOccurrence],
    ) -> TagResults {
        collect_results(join_all(occurrences.iter().map(|occurrence| resolve(context, occurrence))).await)
    }
}

async fn resolve(
    context: &DigestContext,
    occurrence: &TagOccurrence,
) -> Result<Option<WriteBack>, TagError> {
    let path = &occurrence.path;
    let invalid = |message: String| TagError::InvalidSecret { path: path.clone(), message };

    let protected = string_field(&occurrence.data, "protected").ok_or_else(|| {
        invalid("protected header is missing".to_string())
    })?;
    let encoding = header_encoding(protected).map_err(invalid)?;

    match encoding.as_str() {
        DEVICE_ENCRYPTION => Ok(None),
        NO_ENCRYPTION => {
            let ciphertext = string_field(&occurrence.data, "ciphertext")
                .ok_or_else(|| invalid("ciphertext is missing".to_string()))?;
            let plaintext = Zeroizing::new(
                decode_base64(ciphertext)
                    .map_err(|e| invalid(format!("ciphertext is not base64: {}", e)))?,
            );

            if !context.device().encrypts_secrets_immediately() {
                tracing::debug!(path = %path, device = %context.device(), "deferring secret encryption");
                return Ok(None);
            }

            let device_ciphertext = encrypt(context, path, &plaintext).await?;
            let mut payload = occurrence.data.as_object().cloned().unwrap_or_default();
            payload.insert("ciphertext".to_string(), json!(STANDARD.encode(device_ciphertext)));
            payload.insert("protected".to_string(), json!(device_header()));
            payload.insert("miniJWE".to_string(), json!(true));
            Ok(Some(occurrence.replace_with(Value::Object(payload))))
        }
        other => Err(invalid(format!("unsupported encryption '{}'", other))),
    }
}

/// Encrypt through the context's encryptor, mapping failures to [`TagError::Encryption`].
pub(crate) async fn encrypt(
    context: &DigestContext,
    path: &DeclarationPath,
    plaintext: &[u8],
) -> Result<String, TagError> {
    let encryptor = context.encryptor().ok_or_else(|| TagError::Encryption {
        path: path.clone(),
        message: "no secret encryptor configured".to_string(),
    })?;
    encryptor
        .encrypt(plaintext)
        .await
        .map_err(|message| TagError::Encryption { path: path.clone(), message })
}

fn string_field<'v>(data: &'v Value, field: &str) -> Option<&'v str> {
    data.get(field).and_then(Value::as_str)
}

fn header_encoding(protected: &str) -> Result<String, String> {
    let raw = decode_base64(protected).map_err(|e| format!("protected header is not base64: {}", e))?;
    let header: Value =
        serde_json::from_slice(&raw).map_err(|e| format!("protected header is not JSON: {}", e))?;
    header
        .get("enc")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| "protected header has no 'enc'".to_string())
}

/// The protected header of device-encrypted payloads.
pub fn device_header() -> String {
    STANDARD.encode(r#"{"alg":"dir","enc":"f5sv"}"#)
}

/// Decode standard or URL-safe base64, padded or not.
pub(crate) fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalized)
}
