//! Materialized list of posts owned by the cache.

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::posts::{Post, PostId};

/// Ordered posts as last received from the store, with optimistic edits
/// applied on top.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    posts: Vec<Post>,
    fetched_at: Option<OffsetDateTime>,
    invalidated: bool,
}

impl Snapshot {
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn fetched_at(&self) -> Option<OffsetDateTime> {
        self.fetched_at
    }

    /// True once a list fetch has succeeded at least once.
    pub fn is_populated(&self) -> bool {
        self.fetched_at.is_some()
    }

    pub fn is_stale(&self, now: OffsetDateTime, stale_after: Duration) -> bool {
        let Some(fetched_at) = self.fetched_at else {
            return true;
        };
        if self.invalidated {
            return true;
        }
        let elapsed = now - fetched_at;
        !elapsed.is_negative() && elapsed.unsigned_abs() >= stale_after
    }

    pub fn position(&self, id: PostId) -> Option<usize> {
        self.posts.iter().position(|post| post.id == id)
    }

    pub fn get(&self, id: PostId) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == id)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub(crate) fn install(&mut self, posts: Vec<Post>, fetched_at: OffsetDateTime) {
        self.posts = posts;
        self.fetched_at = Some(fetched_at);
        self.invalidated = false;
    }

    pub(crate) fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub(crate) fn prepend(&mut self, post: Post) {
        self.posts.insert(0, post);
    }

    /// Swap the entry at `index`, returning the previous value.
    pub(crate) fn replace_at(&mut self, index: usize, post: Post) -> Post {
        std::mem::replace(&mut self.posts[index], post)
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Post {
        self.posts.remove(index)
    }

    /// Put `post` back where it was: in place if an entry with its id is
    /// present, otherwise at `index` (clamped to the current length).
    pub(crate) fn restore(&mut self, index: usize, post: Post) {
        if let Some(position) = self.position(post.id) {
            self.posts[position] = post;
        } else {
            let index = index.min(self.posts.len());
            self.posts.insert(index, post);
        }
    }

    /// Replace the provisional entry with the post the store confirmed.
    ///
    /// Any other entry already carrying the confirmed id is dropped so the
    /// snapshot keeps one post per id.
    pub(crate) fn commit_provisional(&mut self, provisional: PostId, committed: Post) {
        let committed_id = committed.id;
        match self.position(provisional) {
            Some(index) => self.posts[index] = committed,
            None => self.posts.insert(0, committed),
        }
        let mut kept_first = false;
        self.posts.retain(|post| {
            if post.id != committed_id {
                return true;
            }
            if kept_first {
                return false;
            }
            kept_first = true;
            true
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStatus {
    /// No list fetch has succeeded yet.
    Loading,
    Ready,
    /// No list fetch has succeeded and the latest one failed.
    Failed,
}

/// What a list view renders: status plus the current posts.
#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub status: ListStatus,
    pub posts: Vec<Post>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub fetched_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ListView {
    pub(crate) fn from_snapshot(snapshot: &Snapshot, last_error: Option<&str>) -> Self {
        let status = match (snapshot.is_populated(), last_error) {
            (true, _) => ListStatus::Ready,
            (false, Some(_)) => ListStatus::Failed,
            (false, None) => ListStatus::Loading,
        };
        Self {
            status,
            posts: snapshot.posts.clone(),
            fetched_at: snapshot.fetched_at,
            error: last_error.map(str::to_string),
        }
    }
}
