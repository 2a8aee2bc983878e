//! Traditional OpenSSL encrypted PEM (`Proc-Type: 4,ENCRYPTED`).
//!
//! The key is derived with `EVP_BytesToKey` (MD5, one iteration) salted with
//! the first eight bytes of the IV, and the body is AES-256-CBC with PKCS#7
//! padding.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::pkcs12::encode_pem;
use crate::errors::CertificateError;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Encrypt `der` under `password` and wrap it as `label` PEM with DEK-Info headers.
pub fn encrypt(label: &str, der: &[u8], password: &str) -> Result<String, CertificateError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let key = bytes_to_key(password.as_bytes(), &iv[..8]);

    let ciphertext = cbc::Encryptor::<Aes256>::new_from_slices(key.as_slice(), &iv)
        .map_err(|e| CertificateError::KeyEncryption(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(der);

    let armored = encode_pem(label, &ciphertext);
    let (begin, body) = armored
        .split_once('\n')
        .ok_or_else(|| CertificateError::KeyEncryption("malformed PEM armor".to_string()))?;
    Ok(format!(
        "{}\nProc-Type: 4,ENCRYPTED\nDEK-Info: AES-256-CBC,{}\n\n{}",
        begin,
        hex::encode_upper(iv),
        body
    ))
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn bytes_to_key(password: &[u8], salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    let mut previous: Option<Vec<u8>> = None;
    let mut filled = 0;

    while filled < KEY_LEN {
        let mut hasher = Md5::new();
        if let Some(previous) = &previous {
            hasher.update(previous);
        }
        hasher.update(password);
        hasher.update(salt);
        let digest = hasher.finalize();

        let take = (KEY_LEN - filled).min(digest.len());
        key[filled..filled + take].copy_from_slice(&digest[..take]);
        filled += take;
        previous = Some(digest.to_vec());
    }

    key
}
