use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("provider discovery failed: {0}")]
    Discovery(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("no ID token in provider response")]
    MissingIdToken,
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
    #[error("ID token verification failed: {0}")]
    Verification(String),
}
