//! Plain-text credentials inside authentication blocks.
//!
//! The device encrypts at most [`CHUNK_SIZE`] bytes at a time, so longer
//! credentials are split, encrypted chunk by chunk and joined with `,`.

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use serde_json::Value;

use super::secret::encrypt;
use super::{collect_results, TagError, TagOccurrence, TagProcessor, TagResults, WriteBack};
use crate::declaration::DigestContext;

pub const CHUNK_SIZE: usize = 2048;

/// Prefix of values that are already device ciphertext.
const DEVICE_CIPHERTEXT_PREFIX: &str = "$M$";

/// Processor for [`super::TagKind::LongSecret`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LongSecretTagProcessor;

#[async_trait]
impl TagProcessor for LongSecretTagProcessor {
    async fn process(
        &self,
        context: &DigestContext,
        _declaration: &Value,
        occurrences: &[TagOccurrence],
    ) -> TagResults {
        if !context.device().encrypts_secrets_immediately() {
            tracing::debug!(count = occurrences.len(), "deferring credential encryption");
            return Vec::new();
        }

        collect_results(join_all(occurrences.iter().map(|occurrence| resolve(context, occurrence))).await)
    }
}

async fn resolve(
    context: &DigestContext,
    occurrence: &TagOccurrence,
) -> Result<Option<WriteBack>, TagError> {
    let Some(credential) = occurrence.data.as_str() else {
        return Ok(None);
    };
    if credential.is_empty() || credential.starts_with(DEVICE_CIPHERTEXT_PREFIX) {
        return Ok(None);
    }

    let encrypted = try_join_all(
        chunks(credential).map(|chunk| encrypt(context, &occurrence.path, chunk.as_bytes())),
    )
    .await?;
    Ok(Some(occurrence.replace_with(Value::String(encrypted.join(",")))))
}

/// Split on character boundaries into pieces of at most [`CHUNK_SIZE`] bytes.
fn chunks(value: &str) -> impl Iterator<Item = &str> {
    let mut rest = value;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut end = rest.len().min(CHUNK_SIZE);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}
