// ═══════════════════════════════════════════════════════════════
// Shared Access Signature signing
// ═══════════════════════════════════════════════════════════════
//
// The signed string is the URL-encoded audience and the expiry
// seconds joined by a newline:
//
//   "<encoded audience>\n<se>"
//
// The MAC is base64 encoded (standard alphabet, padded). On the
// wire the signature is additionally URL-encoded; verification
// accepts the encoded form and the bare base64 form, nothing else.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::errors::SasError;

use super::grammar::CANONICAL_SEPARATOR;
use super::SasToken;

type HmacSha256Mac = Hmac<Sha256>;

/// Keyed MAC used to sign the canonical string.
pub trait MacAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    fn compute(&self, key: &[u8], message: &[u8]) -> Vec<u8>;
}

/// HMAC-SHA256, the algorithm for symmetric shared access keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256;

impl MacAlgorithm for HmacSha256 {
    fn name(&self) -> &'static str {
        "HMAC-SHA256"
    }

    fn compute(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256Mac::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Secret key material, wiped from memory on drop.
#[derive(Clone)]
pub struct SigningKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl SigningKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, SasError> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.is_empty() {
            return Err(SasError::BlankArgument("key"));
        }
        Ok(Self { bytes })
    }

    /// Decode a base64 key as found in connection strings.
    pub fn from_base64(encoded: &str) -> Result<Self, SasError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(SasError::BlankArgument("key"));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SasError::InvalidKey(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

pub fn canonical_string(encoded_audience: &str, expiry_raw: &str) -> String {
    let mut canonical = String::with_capacity(encoded_audience.len() + expiry_raw.len() + 1);
    canonical.push_str(encoded_audience);
    canonical.push(CANONICAL_SEPARATOR);
    canonical.push_str(expiry_raw);
    canonical
}

/// Sign `canonical` with HMAC-SHA256 and return the base64 digest.
pub fn sign(key: &SigningKey, canonical: &str) -> String {
    sign_with(&HmacSha256, key, canonical)
}

pub fn sign_with(algorithm: &dyn MacAlgorithm, key: &SigningKey, canonical: &str) -> String {
    let digest = algorithm.compute(key.as_bytes(), canonical.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Recompute the signature of `token` and compare it in constant time.
///
/// The token's `sig` must match either the URL-encoded digest (upper-case
/// hex escapes) or the bare base64 digest.
pub fn verify(token: &SasToken, key: &SigningKey) -> bool {
    verify_with(&HmacSha256, token, key)
}

pub fn verify_with(algorithm: &dyn MacAlgorithm, token: &SasToken, key: &SigningKey) -> bool {
    let canonical = canonical_string(token.encoded_audience(), token.expiry_raw());
    let expected = sign_with(algorithm, key, &canonical);
    let expected_wire = urlencoding::encode(&expected);

    let provided = token.signature().as_bytes();
    let matched: bool = (provided.ct_eq(expected_wire.as_bytes())
        | provided.ct_eq(expected.as_bytes()))
    .into();
    if !matched {
        tracing::debug!(
            policy = token.policy_name(),
            algorithm = algorithm.name(),
            "signature mismatch"
        );
    }
    matched
}
