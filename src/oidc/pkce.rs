//! Random correlation values and the PKCE S256 challenge.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::error::FlowError;

const STATE_BYTES: usize = 32;
const NONCE_BYTES: usize = 32;
// 64 bytes encode to 86 characters, inside the 43..=128 range RFC 7636 allows.
const VERIFIER_BYTES: usize = 64;

/// Base64url (unpadded) encoding of `len` bytes from the OS RNG.
///
/// # Errors
/// Returns an error if the OS RNG is unavailable.
pub fn random_url_safe(len: usize) -> Result<String, FlowError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| FlowError::Rng(err.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Opaque, unguessable `state` value.
///
/// # Errors
/// Returns an error if the OS RNG is unavailable.
pub fn generate_state() -> Result<String, FlowError> {
    random_url_safe(STATE_BYTES)
}

/// Opaque, unguessable `nonce` value bound into the ID token.
///
/// # Errors
/// Returns an error if the OS RNG is unavailable.
pub fn generate_nonce() -> Result<String, FlowError> {
    random_url_safe(NONCE_BYTES)
}

/// High-entropy PKCE code verifier.
///
/// # Errors
/// Returns an error if the OS RNG is unavailable.
pub fn generate_code_verifier() -> Result<String, FlowError> {
    random_url_safe(VERIFIER_BYTES)
}

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}
