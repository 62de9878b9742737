//! Post entity as exchanged with the remote post store.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Identifier of a post.
///
/// Ids assigned by the remote store are positive. Negative ids are
/// provisional: they are issued locally for posts whose creation has not
/// been confirmed yet and never leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl PostId {
    pub fn is_provisional(self) -> bool {
        self.0 < 0
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PostId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Post {
    /// Build a post from a draft under the given id.
    pub fn from_draft(id: PostId, draft: &PostDraft) -> Self {
        Self {
            id,
            title: draft.title.clone(),
            body: draft.body.clone(),
            user_id: draft.user_id,
            created_at: None,
            updated_at: None,
        }
    }

    /// The mutable fields of this post, as sent to the store on update.
    pub fn to_draft(&self) -> PostDraft {
        PostDraft {
            title: self.title.clone(),
            body: self.body.clone(),
            user_id: self.user_id,
        }
    }

    /// Case-insensitive substring match against title or body.
    ///
    /// A blank query matches every post.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle) || self.body.to_lowercase().contains(&needle)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_fields(&self.title, &self.body)
    }
}

/// Fields a user submits to create or edit a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            user_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_fields(&self.title, &self.body)
    }
}

fn validate_fields(title: &str, body: &str) -> Result<(), DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    if body.trim().is_empty() {
        return Err(DomainError::validation("body must not be empty"));
    }
    Ok(())
}
