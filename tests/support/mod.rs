//! Store double whose calls are settled by the test.
//!
//! Every call the cache makes is forwarded on a channel together with a
//! responder; nothing resolves until the test answers it, so tests can
//! observe the snapshot while a remote step is in flight and choose the
//! order in which overlapping calls complete.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blogdeck::application::store::{PostStore, StoreError};
use blogdeck::cache::{CacheConfig, PostCache, RefreshOutcome};
use blogdeck::domain::posts::{Post, PostDraft, PostId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

#[derive(Debug)]
pub enum StoreCall {
    List { reply: Reply<Vec<Post>> },
    Get { id: PostId, reply: Reply<Post> },
    Create { draft: PostDraft, reply: Reply<Post> },
    Update { id: PostId, fields: PostDraft, reply: Reply<Post> },
    Delete { id: PostId, reply: Reply<()> },
}

impl StoreCall {
    pub fn into_list(self) -> Reply<Vec<Post>> {
        match self {
            StoreCall::List { reply } => reply,
            other => panic!("expected a list call, got {other:?}"),
        }
    }

    pub fn into_create(self) -> (PostDraft, Reply<Post>) {
        match self {
            StoreCall::Create { draft, reply } => (draft, reply),
            other => panic!("expected a create call, got {other:?}"),
        }
    }

    pub fn into_update(self) -> (PostId, PostDraft, Reply<Post>) {
        match self {
            StoreCall::Update { id, fields, reply } => (id, fields, reply),
            other => panic!("expected an update call, got {other:?}"),
        }
    }

    pub fn into_delete(self) -> (PostId, Reply<()>) {
        match self {
            StoreCall::Delete { id, reply } => (id, reply),
            other => panic!("expected a delete call, got {other:?}"),
        }
    }
}

pub struct ChannelStore {
    calls: mpsc::UnboundedSender<StoreCall>,
}

impl ChannelStore {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> StoreCall) -> Result<T, StoreError> {
        let (reply, answer) = oneshot::channel();
        self.calls
            .send(build(reply))
            .map_err(|_| StoreError::unavailable("test harness gone"))?;
        answer
            .await
            .unwrap_or_else(|_| Err(StoreError::unavailable("call dropped")))
    }
}

#[async_trait]
impl PostStore for ChannelStore {
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        self.call(|reply| StoreCall::List { reply }).await
    }

    async fn get_post(&self, id: PostId) -> Result<Post, StoreError> {
        self.call(|reply| StoreCall::Get { id, reply }).await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, StoreError> {
        let draft = draft.clone();
        self.call(|reply| StoreCall::Create { draft, reply }).await
    }

    async fn update_post(&self, id: PostId, fields: &PostDraft) -> Result<Post, StoreError> {
        let fields = fields.clone();
        self.call(|reply| StoreCall::Update { id, fields, reply })
            .await
    }

    async fn delete_post(&self, id: PostId) -> Result<(), StoreError> {
        self.call(|reply| StoreCall::Delete { id, reply }).await
    }
}

/// Calls issued by the cache, in issue order.
pub struct StoreCalls {
    rx: mpsc::UnboundedReceiver<StoreCall>,
}

impl StoreCalls {
    pub async fn next(&mut self) -> StoreCall {
        timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("store call within timeout")
            .expect("store still attached")
    }

    /// Let spawned tasks run, then assert the cache issued nothing new.
    pub async fn assert_idle(&mut self) {
        settle().await;
        if let Ok(call) = self.rx.try_recv() {
            panic!("unexpected store call: {call:?}");
        }
    }
}

pub fn channel_store() -> (Arc<ChannelStore>, StoreCalls) {
    let (calls, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelStore { calls }), StoreCalls { rx })
}

pub fn post(id: i64, title: &str) -> Post {
    Post {
        id: PostId(id),
        title: title.to_string(),
        body: format!("body of {title}"),
        user_id: Some(1),
        created_at: None,
        updated_at: None,
    }
}

pub fn posts(ids: &[i64]) -> Vec<Post> {
    ids.iter().map(|id| post(*id, &format!("post {id}"))).collect()
}

pub fn ids(posts: &[Post]) -> Vec<i64> {
    posts.iter().map(|post| post.id.get()).collect()
}

/// Yield until spawned tasks have had a chance to run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// A cache whose snapshot already holds `initial`.
pub async fn loaded_cache(initial: Vec<Post>) -> (PostCache, StoreCalls) {
    let config = CacheConfig {
        invalidate_after_mutation: false,
        ..CacheConfig::default()
    };
    loaded_cache_with(initial, config).await
}

pub async fn loaded_cache_with(initial: Vec<Post>, config: CacheConfig) -> (PostCache, StoreCalls) {
    let (store, mut calls) = channel_store();
    let cache = PostCache::new(store, config);

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    calls
        .next()
        .await
        .into_list()
        .send(Ok(initial))
        .expect("refresh waiting");
    let outcome = refresh.await.expect("refresh task").expect("refresh ok");
    assert!(matches!(outcome, RefreshOutcome::Applied { .. }));

    (cache, calls)
}
