//! Contract of the remote post store feeding the cache.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::posts::{Post, PostDraft, PostId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("post not found")]
    NotFound,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("server error: status {status} body {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse body: {0}")]
    Decode(String),
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// CRUD surface of the post store.
///
/// Implementations are expected to be cheap to share behind an `Arc`; the
/// cache issues calls concurrently from spawned tasks.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError>;

    async fn get_post(&self, id: PostId) -> Result<Post, StoreError>;

    /// Persist a new post. The returned post carries the server-assigned id.
    async fn create_post(&self, draft: &PostDraft) -> Result<Post, StoreError>;

    async fn update_post(&self, id: PostId, fields: &PostDraft) -> Result<Post, StoreError>;

    async fn delete_post(&self, id: PostId) -> Result<(), StoreError>;
}
