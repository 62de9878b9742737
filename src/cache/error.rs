use thiserror::Error;

use crate::application::store::StoreError;
use crate::domain::error::DomainError;
use crate::domain::posts::PostId;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Rejected before any network call; the snapshot is untouched.
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("post {id} not found")]
    NotFound { id: PostId },
    /// The store call failed; any optimistic change has been rolled back.
    #[error("remote store error: {0}")]
    Remote(#[from] StoreError),
    #[error("mutation task aborted: {0}")]
    Aborted(String),
}

impl CacheError {
    pub fn not_found(id: PostId) -> Self {
        Self::NotFound { id }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl From<DomainError> for CacheError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => Self::Validation { message },
        }
    }
}
