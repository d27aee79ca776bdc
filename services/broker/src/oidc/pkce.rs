//! State and proof-key-for-code-exchange material (RFC 7636, S256).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Generate the OAuth `state` parameter: 32 random bytes (256 bits),
/// base64url-encoded.
///
/// The session record key is a lossy sanitization of this value, so the full
/// 256 bits keep accidental key collisions negligible. Do not shrink it.
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a PKCE code verifier: 48 random bytes encoded to a 64-character
/// URL-safe string, inside the 43..=128 range RFC 7636 requires.
#[must_use]
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 48];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
