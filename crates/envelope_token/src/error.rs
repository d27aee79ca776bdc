use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("signing key must be at least 32 bytes")]
    SigningKeyTooShort,
    #[error("content key must be exactly 32 bytes")]
    ContentKeyLength,
    #[error("key size must be at least 1 byte")]
    EmptyKey,
    #[error("encryption failure")]
    Crypto,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    ExpiredToken,
}
