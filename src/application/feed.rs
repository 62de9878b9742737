//! Read models for the home page, the admin dashboard and the detail page.

use serde::Serialize;

use crate::cache::{CacheError, ListStatus, PostCache};
use crate::domain::posts::{Post, PostId};

#[derive(Debug, Clone, Serialize)]
pub struct HomeView {
    pub status: ListStatus,
    pub featured: Option<Post>,
    pub posts: Vec<Post>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// The query filtered every post out.
    NoMatches,
    /// There are no posts at all.
    NoPosts,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminView {
    pub status: ListStatus,
    pub query: String,
    pub posts: Vec<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty: Option<EmptyReason>,
}

#[derive(Clone)]
pub struct FeedService {
    cache: PostCache,
}

impl FeedService {
    pub fn new(cache: PostCache) -> Self {
        Self { cache }
    }

    pub fn home(&self) -> HomeView {
        let view = self.cache.list();
        HomeView {
            status: view.status,
            featured: view.posts.first().cloned(),
            total: view.posts.len(),
            posts: view.posts,
        }
    }

    pub fn admin(&self, query: &str) -> AdminView {
        let view = self.cache.list();
        let total = view.posts.len();
        let posts = filter_posts(view.posts, query);
        let empty = match (posts.is_empty(), total) {
            (false, _) => None,
            (true, 0) => Some(EmptyReason::NoPosts),
            (true, _) => Some(EmptyReason::NoMatches),
        };
        AdminView {
            status: view.status,
            query: query.to_string(),
            posts,
            empty,
        }
    }

    pub async fn detail(&self, id: PostId) -> Result<Post, CacheError> {
        self.cache.get(id).await
    }
}

pub fn filter_posts(posts: Vec<Post>, query: &str) -> Vec<Post> {
    posts.into_iter().filter(|post| post.matches(query)).collect()
}
