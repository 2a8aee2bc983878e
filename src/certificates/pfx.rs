//! PFX (PKCS#12) container decoding.
//!
//! Handles the bag protections OpenSSL actually emits: the legacy
//! password-based schemes (RC2 and triple DES keyed through the PKCS#12 KDF)
//! and PBES2. Only certificate and key bags are extracted; anything else in
//! the bundle is skipped.

use der::asn1::{Any, ObjectIdentifier, OctetString};
use der::{Decode, DecodeOwned, Encode, Sequence};
use hmac::digest::core_api::BlockSizeUser;
use hmac::digest::Digest;
use hmac::{Mac, SimpleHmac};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, InnerIvInit, KeyIvInit};

use crate::errors::CertificateError;

const DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ENCRYPTED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.6");

const KEY_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.1");
const SHROUDED_KEY_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.2");
const CERT_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.3");
const X509_CERTIFICATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.22.1");

const PBE_SHA1_3DES: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.1.3");
const PBE_SHA1_RC2_128: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.1.5");
const PBE_SHA1_RC2_40: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.1.6");
const PBES2: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.5.13");

const SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// Block length of every digest the KDF is used with.
const KDF_BLOCK: usize = 64;

const PURPOSE_KEY: u8 = 1;
const PURPOSE_IV: u8 = 2;
const PURPOSE_MAC: u8 = 3;

#[derive(Sequence)]
struct AlgorithmIdentifier {
    oid: ObjectIdentifier,
    parameters: Option<Any>,
}

#[derive(Sequence)]
struct Pfx {
    version: u8,
    auth_safe: ContentInfo,
    mac_data: Option<MacData>,
}

#[derive(Sequence)]
struct ContentInfo {
    content_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    content: Option<Any>,
}

#[derive(Sequence)]
struct MacData {
    mac: DigestInfo,
    mac_salt: OctetString,
    iterations: Option<u32>,
}

#[derive(Sequence)]
struct DigestInfo {
    algorithm: AlgorithmIdentifier,
    digest: OctetString,
}

#[derive(Sequence)]
struct EncryptedData {
    version: u8,
    encrypted_content_info: EncryptedContentInfo,
}

#[derive(Sequence)]
struct EncryptedContentInfo {
    content_type: ObjectIdentifier,
    content_encryption_algorithm: AlgorithmIdentifier,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    encrypted_content: Option<OctetString>,
}

#[derive(Sequence)]
struct SafeBag {
    bag_id: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    bag_value: Any,
    bag_attributes: Option<Any>,
}

#[derive(Sequence)]
struct CertBag {
    cert_id: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    cert_value: OctetString,
}

/// Same layout as PKCS#8 `EncryptedPrivateKeyInfo`, but the algorithm may be
/// one of the PKCS#12 PBE schemes the pkcs8 crate does not know.
#[derive(Sequence)]
struct ShroudedKey {
    algorithm: AlgorithmIdentifier,
    encrypted_data: OctetString,
}

#[derive(Sequence)]
struct Pkcs12PbeParams {
    salt: OctetString,
    iterations: u32,
}

/// Certificates and the private key found in a PFX.
pub(crate) struct PfxContents {
    /// DER certificates in bag order.
    pub certificates: Vec<Vec<u8>>,
    /// DER `PrivateKeyInfo`.
    pub private_key: Option<Zeroizing<Vec<u8>>>,
}

/// Verify and decode a DER PFX.
pub(crate) fn decode_pfx(der: &[u8], password: &str) -> Result<PfxContents, CertificateError> {
    let pfx = Pfx::from_der(der).map_err(malformed)?;
    if pfx.version != 3 {
        return Err(CertificateError::Pkcs12Decode(format!("unsupported PFX version {}", pfx.version)));
    }
    if pfx.auth_safe.content_type != DATA {
        return Err(CertificateError::Pkcs12Decode(
            "public-key protected bundles are not supported".to_string(),
        ));
    }
    let auth_safe: OctetString = reparse(required(pfx.auth_safe.content.as_ref())?)?;
    let auth_safe = auth_safe.as_bytes();

    let secret = match &pfx.mac_data {
        Some(mac_data) => unlock(mac_data, auth_safe, password)?,
        None => bmp_password(password),
    };

    let mut contents = PfxContents { certificates: Vec::new(), private_key: None };
    for safe in Vec::<ContentInfo>::from_der(auth_safe).map_err(malformed)? {
        let content = required(safe.content.as_ref())?;
        let bags = if safe.content_type == DATA {
            let data: OctetString = reparse(content)?;
            Vec::<SafeBag>::from_der(data.as_bytes()).map_err(malformed)?
        } else if safe.content_type == ENCRYPTED_DATA {
            let encrypted: EncryptedData = reparse(content)?;
            let info = encrypted.encrypted_content_info;
            let ciphertext = info.encrypted_content.as_ref().map(OctetString::as_bytes).unwrap_or_default();
            let plain = decrypt(&info.content_encryption_algorithm, ciphertext, &secret, password)?;
            Vec::<SafeBag>::from_der(&plain).map_err(malformed)?
        } else {
            tracing::debug!(content_type = %safe.content_type, "skipping unsupported PFX safe");
            continue;
        };
        for bag in bags {
            collect_bag(bag, &secret, password, &mut contents)?;
        }
    }
    Ok(contents)
}

fn collect_bag(
    bag: SafeBag,
    secret: &[u8],
    password: &str,
    contents: &mut PfxContents,
) -> Result<(), CertificateError> {
    if bag.bag_id == CERT_BAG {
        let cert: CertBag = reparse(&bag.bag_value)?;
        if cert.cert_id == X509_CERTIFICATE {
            contents.certificates.push(cert.cert_value.as_bytes().to_vec());
        }
    } else if bag.bag_id == KEY_BAG {
        contents.private_key = Some(Zeroizing::new(bag.bag_value.to_der().map_err(malformed)?));
    } else if bag.bag_id == SHROUDED_KEY_BAG {
        let shrouded: ShroudedKey = reparse(&bag.bag_value)?;
        let key = decrypt(&shrouded.algorithm, shrouded.encrypted_data.as_bytes(), secret, password)?;
        contents.private_key = Some(key);
    } else {
        tracing::debug!(bag_id = %bag.bag_id, "skipping unsupported PFX bag");
    }
    Ok(())
}

/// Check the integrity MAC and return the KDF password that produced it.
/// Some writers key an empty password as zero bytes rather than a lone
/// BMP terminator, so both are tried.
fn unlock(mac_data: &MacData, auth_safe: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
    let mut candidates = vec![bmp_password(password)];
    if password.is_empty() {
        candidates.push(Zeroizing::new(Vec::new()));
    }
    candidates
        .into_iter()
        .find(|candidate| mac_matches(mac_data, auth_safe, candidate))
        .ok_or_else(|| {
            CertificateError::Pkcs12Decode("MAC verification failed: wrong password or corrupt bundle".to_string())
        })
}

fn mac_matches(mac_data: &MacData, content: &[u8], password: &[u8]) -> bool {
    let salt = mac_data.mac_salt.as_bytes();
    let iterations = mac_data.iterations.unwrap_or(1);
    let expected = mac_data.mac.digest.as_bytes();
    let algorithm = mac_data.mac.algorithm.oid;
    if algorithm == SHA1 {
        hmac_matches::<Sha1>(password, salt, iterations, content, expected)
    } else if algorithm == SHA256 {
        hmac_matches::<Sha256>(password, salt, iterations, content, expected)
    } else {
        tracing::debug!(algorithm = %algorithm, "unsupported PFX MAC digest");
        false
    }
}

fn hmac_matches<D: Digest + BlockSizeUser>(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    content: &[u8],
    expected: &[u8],
) -> bool {
    let key = derive_key::<D>(password, salt, PURPOSE_MAC, iterations, <D as Digest>::output_size());
    let Ok(mut mac) = <SimpleHmac<D> as Mac>::new_from_slice(&key) else {
        return false;
    };
    mac.update(content);
    mac.verify_slice(expected).is_ok()
}

fn decrypt(
    algorithm: &AlgorithmIdentifier,
    ciphertext: &[u8],
    secret: &[u8],
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
    if algorithm.oid == PBES2 {
        // PBES2 keys from the raw password, not the BMP form.
        let encoded = algorithm.to_der().map_err(malformed)?;
        let scheme = pkcs5::EncryptionScheme::from_der(&encoded).map_err(malformed)?;
        return scheme
            .decrypt(password.as_bytes(), ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| CertificateError::Pkcs12Decode(format!("unable to decrypt PBES2 content: {}", e)));
    }

    let params: Pkcs12PbeParams = reparse(required(algorithm.parameters.as_ref())?)?;
    let salt = params.salt.as_bytes();
    let iv = derive_key::<Sha1>(secret, salt, PURPOSE_IV, params.iterations, 8);

    let plain = if algorithm.oid == PBE_SHA1_3DES {
        let key = derive_key::<Sha1>(secret, salt, PURPOSE_KEY, params.iterations, 24);
        cbc::Decryptor::<des::TdesEde3>::new_from_slices(&key, &iv)
            .map_err(malformed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
    } else if algorithm.oid == PBE_SHA1_RC2_40 || algorithm.oid == PBE_SHA1_RC2_128 {
        let key_len = if algorithm.oid == PBE_SHA1_RC2_40 { 5 } else { 16 };
        let key = derive_key::<Sha1>(secret, salt, PURPOSE_KEY, params.iterations, key_len);
        let cipher = rc2::Rc2::new_with_eff_key_len(&key, key_len * 8);
        cbc::Decryptor::<rc2::Rc2>::inner_iv_slice_init(cipher, &iv)
            .map_err(malformed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
    } else {
        return Err(CertificateError::Pkcs12Decode(format!(
            "unsupported PFX encryption algorithm {}",
            algorithm.oid
        )));
    };
    plain
        .map(Zeroizing::new)
        .map_err(|_| CertificateError::Pkcs12Decode("unable to decrypt PFX content: bad padding".to_string()))
}

/// Password as a NUL-terminated big-endian BMPString.
fn bmp_password(password: &str) -> Zeroizing<Vec<u8>> {
    let mut encoded = Zeroizing::new(Vec::with_capacity(password.len() * 2 + 2));
    for unit in password.encode_utf16() {
        encoded.extend_from_slice(&unit.to_be_bytes());
    }
    encoded.extend_from_slice(&[0, 0]);
    encoded
}

/// The PKCS#12 key derivation function (RFC 7292 appendix B.2).
fn derive_key<D: Digest>(
    password: &[u8],
    salt: &[u8],
    purpose: u8,
    iterations: u32,
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut input = repeat_to_block(salt);
    input.extend_from_slice(&repeat_to_block(password));

    let mut derived = Zeroizing::new(Vec::with_capacity(len));
    loop {
        let mut hasher = D::new();
        hasher.update([purpose; KDF_BLOCK]);
        hasher.update(&*input);
        let mut block = hasher.finalize();
        for _ in 1..iterations {
            block = D::digest(&block);
        }

        let take = block.len().min(len - derived.len());
        derived.extend_from_slice(&block[..take]);
        if derived.len() == len {
            return derived;
        }

        let filler: Vec<u8> = block.iter().copied().cycle().take(KDF_BLOCK).collect();
        for chunk in input.chunks_mut(KDF_BLOCK) {
            let mut carry = 1u16;
            for (byte, add) in chunk.iter_mut().zip(&filler).rev() {
                let sum = u16::from(*byte) + u16::from(*add) + carry;
                *byte = sum as u8;
                carry = sum >> 8;
            }
        }
    }
}

fn repeat_to_block(source: &[u8]) -> Zeroizing<Vec<u8>> {
    let len = KDF_BLOCK * source.len().div_ceil(KDF_BLOCK);
    Zeroizing::new(source.iter().copied().cycle().take(len).collect())
}

fn reparse<T: DecodeOwned>(any: &Any) -> Result<T, CertificateError> {
    T::from_der(&any.to_der().map_err(malformed)?).map_err(malformed)
}

fn required(value: Option<&Any>) -> Result<&Any, CertificateError> {
    value.ok_or_else(|| CertificateError::Pkcs12Decode("PFX structure is missing its content".to_string()))
}

fn malformed(error: impl std::fmt::Display) -> CertificateError {
    CertificateError::Pkcs12Decode(error.to_string())
}
