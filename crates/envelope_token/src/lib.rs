//! Stateless bearer envelopes for the kauth broker.
//!
//! An envelope is an encrypted, MAC-authenticated, base64url-encoded record
//! held by the client and opaque to it. Two envelope kinds exist:
//!
//! - **Session envelopes** carry the OAuth `state` and PKCE verifier for an
//!   in-flight login, so any broker replica can serve `/watch` without a
//!   session lookup by token.
//! - **Refresh envelopes** carry the upstream provider's refresh token,
//!   pinned to a user email and a monotonically increasing rotation counter.
//!
//! Wire format for plaintext `P`:
//!
//! ```text
//! base64url( HMAC-SHA256(signing_key, nonce || ct) || nonce || ct )
//! where ct = AES-256-GCM(content_key, nonce, json(P))
//! ```
//!
//! Validation is strict and ordered: decode, constant-time MAC verification,
//! decryption, field decoding, expiry check. No field is returned before the
//! expiry check passes. The MAC-before-decrypt order keeps padding/oracle
//! games against the cipher out of reach.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

mod error;

pub use error::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum length of the HMAC signing key.
pub const MIN_SIGNING_KEY_LEN: usize = 32;
/// Exact length of the AES-256-GCM content key.
pub const CONTENT_KEY_LEN: usize = 32;

const MAC_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Login-session state carried by the client between `/start-login` and
/// `/watch`. Never persisted server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub state: String,
    pub verifier: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Rotatable refresh context. Replaced wholesale on every successful
/// `/refresh` with `rotation_counter + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEnvelope {
    pub user_email: String,
    pub provider_refresh_token: String,
    pub rotation_counter: u64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Creates and validates both envelope kinds.
///
/// Holds the MAC signing key and the AEAD content key; both are required at
/// construction so a misconfigured broker fails at startup rather than on the
/// first login.
#[derive(Debug)]
pub struct TokenManager {
    signing_key: Vec<u8>,
    content_key: [u8; CONTENT_KEY_LEN],
}

impl TokenManager {
    /// Build a manager from raw key material.
    ///
    /// # Errors
    /// Returns [`Error::SigningKeyTooShort`] if the signing key is shorter
    /// than 32 bytes, and [`Error::ContentKeyLength`] if the content key is
    /// not exactly 32 bytes.
    pub fn new(signing_key: Vec<u8>, content_key: Vec<u8>) -> Result<Self, Error> {
        if signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(Error::SigningKeyTooShort);
        }
        let content_key: [u8; CONTENT_KEY_LEN] = content_key
            .try_into()
            .map_err(|_| Error::ContentKeyLength)?;

        Ok(Self {
            signing_key,
            content_key,
        })
    }

    /// Mint a session envelope valid for `ttl` from now.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] if encryption fails.
    pub fn create_session_envelope(
        &self,
        state: &str,
        verifier: &str,
        ttl: Duration,
    ) -> Result<String, Error> {
        let now = Utc::now();
        let envelope = SessionEnvelope {
            state: state.to_string(),
            verifier: verifier.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };
        let plaintext = serde_json::to_vec(&envelope).map_err(|_| Error::Crypto)?;
        self.seal(&plaintext)
    }

    /// Validate and decode a session envelope.
    ///
    /// # Errors
    /// [`Error::InvalidSignature`] on MAC mismatch, [`Error::InvalidToken`]
    /// on decode or decryption failure, [`Error::ExpiredToken`] once
    /// `expires_at` has passed.
    pub fn validate_session_envelope(&self, token: &str) -> Result<SessionEnvelope, Error> {
        let plaintext = self.open(token)?;
        let envelope: SessionEnvelope =
            serde_json::from_slice(&plaintext).map_err(|_| Error::InvalidToken)?;
        if envelope.expires_at <= Utc::now() {
            return Err(Error::ExpiredToken);
        }
        Ok(envelope)
    }

    /// Mint a refresh envelope valid for `ttl` from now.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] if encryption fails.
    pub fn create_refresh_envelope(
        &self,
        user_email: &str,
        provider_refresh_token: &str,
        rotation_counter: u64,
        ttl: Duration,
    ) -> Result<String, Error> {
        let now = Utc::now();
        let envelope = RefreshEnvelope {
            user_email: user_email.to_string(),
            provider_refresh_token: provider_refresh_token.to_string(),
            rotation_counter,
            issued_at: now,
            expires_at: now + ttl,
        };
        let plaintext = serde_json::to_vec(&envelope).map_err(|_| Error::Crypto)?;
        self.seal(&plaintext)
    }

    /// Validate and decode a refresh envelope.
    ///
    /// # Errors
    /// [`Error::InvalidSignature`] on MAC mismatch, [`Error::InvalidToken`]
    /// on decode or decryption failure, [`Error::ExpiredToken`] once
    /// `expires_at` has passed.
    pub fn validate_refresh_envelope(&self, token: &str) -> Result<RefreshEnvelope, Error> {
        let plaintext = self.open(token)?;
        let envelope: RefreshEnvelope =
            serde_json::from_slice(&plaintext).map_err(|_| Error::InvalidToken)?;
        if envelope.expires_at <= Utc::now() {
            return Err(Error::ExpiredToken);
        }
        Ok(envelope)
    }

    // Encrypt with a fresh random nonce, then MAC nonce || ciphertext.
    fn seal(&self, plaintext: &[u8]) -> Result<String, Error> {
        let cipher = Aes256Gcm::new_from_slice(&self.content_key).map_err(|_| Error::Crypto)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Crypto)?;

        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.signing_key).map_err(|_| Error::Crypto)?;
        mac.update(&nonce);
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        let mut signed = Vec::with_capacity(MAC_LEN + NONCE_LEN + ciphertext.len());
        signed.extend_from_slice(&tag);
        signed.extend_from_slice(&nonce);
        signed.extend_from_slice(&ciphertext);

        Ok(URL_SAFE.encode(signed))
    }

    // Verify the MAC in constant time, then decrypt. The MAC covers
    // everything after it, so any bit flip fails here before the cipher
    // sees a byte.
    fn open(&self, token: &str) -> Result<Vec<u8>, Error> {
        let signed = URL_SAFE.decode(token).map_err(|_| Error::InvalidToken)?;
        if signed.len() < MAC_LEN {
            return Err(Error::InvalidSignature);
        }

        let (tag, sealed) = signed.split_at(MAC_LEN);
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.signing_key).map_err(|_| Error::InvalidSignature)?;
        mac.update(sealed);
        mac.verify_slice(tag).map_err(|_| Error::InvalidSignature)?;

        if sealed.len() < NONCE_LEN {
            return Err(Error::InvalidToken);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher =
            Aes256Gcm::new_from_slice(&self.content_key).map_err(|_| Error::InvalidToken)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::InvalidToken)
    }
}

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
/// Returns [`Error::EmptyKey`] when `len` is zero.
pub fn generate_key(len: usize) -> Result<Vec<u8>, Error> {
    if len == 0 {
        return Err(Error::EmptyKey);
    }
    let mut key = vec![0u8; len];
    OsRng.fill_bytes(&mut key);
    Ok(key)
}
