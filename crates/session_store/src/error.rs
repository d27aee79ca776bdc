use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session record not found: {0}")]
    NotFound(String),
    #[error("session record already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error("watch stream error: {0}")]
    Watch(String),
}

impl Error {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
