//! Optimistic post cache.
//!
//! Every mutation runs in two steps. The local step edits the snapshot
//! immediately and records a pre-image; the remote step calls the store on a
//! spawned task and either commits the edit or restores the pre-image.
//! Mutations on the same id are serialized through a per-id async lock, so a
//! rollback can never clobber a newer optimistic edit. Refreshes are
//! last-issued-wins and re-apply whatever is still pending.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use metrics::counter;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::application::store::{PostStore, StoreError};
use crate::domain::posts::{Post, PostDraft, PostId};

use super::config::CacheConfig;
use super::error::CacheError;
use super::events::{ChangeKind, ChangeNotifier, SnapshotChange};
use super::lock::mutex_lock;
use super::pending::{PendingMutation, PendingSet};
use super::snapshot::{ListView, Snapshot};

const SOURCE: &str = "cache::post_cache";
const METRIC_OPTIMISTIC: &str = "blogdeck_cache_optimistic_total";
const METRIC_ROLLBACK: &str = "blogdeck_cache_rollback_total";
const METRIC_REFRESH_DISCARDED: &str = "blogdeck_cache_refresh_discarded_total";

/// Result of a list refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { posts: usize },
    /// A newer refresh was issued while this one was in flight; its result
    /// (or error) was discarded.
    Superseded,
}

/// Handle on an optimistic mutation whose remote step is in flight.
#[derive(Debug)]
pub struct Mutation<T> {
    correlation: Uuid,
    target: PostId,
    handle: JoinHandle<Result<T, CacheError>>,
}

impl<T> Mutation<T> {
    /// Identifier tying log lines of this mutation together.
    pub fn correlation(&self) -> Uuid {
        self.correlation
    }

    /// Id the mutation was issued against. For creations this is the
    /// provisional id.
    pub fn target(&self) -> PostId {
        self.target
    }

    /// Wait for the store to settle the mutation.
    pub async fn wait(self) -> Result<T, CacheError> {
        match self.handle.await {
            Ok(result) => result,
            Err(error) => Err(CacheError::Aborted(error.to_string())),
        }
    }
}

/// Client-side cache of the post list with optimistic mutations.
///
/// Cloning is cheap; clones share the same snapshot.
#[derive(Clone)]
pub struct PostCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn PostStore>,
    config: CacheConfig,
    runtime: Handle,
    state: Mutex<CacheState>,
    notifier: ChangeNotifier,
}

#[derive(Default)]
struct CacheState {
    snapshot: Snapshot,
    pending: PendingSet,
    id_locks: IdLocks,
    /// Provisional id -> id assigned by the store on commit.
    promoted: HashMap<PostId, PostId>,
    next_provisional: i64,
    refresh_generation: u64,
    /// The latest issued refresh has not settled yet.
    refresh_in_flight: bool,
    last_error: Option<String>,
}

impl CacheState {
    fn issue_provisional_id(&mut self) -> PostId {
        self.next_provisional -= 1;
        PostId(self.next_provisional)
    }

    fn begin_refresh(&mut self) -> u64 {
        self.refresh_generation += 1;
        self.refresh_in_flight = true;
        self.refresh_generation
    }

    /// Invalidate every list fetch issued so far. A list read before a local
    /// edit must not land on top of it once the edit has settled.
    fn supersede_refreshes(&mut self) {
        self.refresh_generation += 1;
        self.refresh_in_flight = false;
    }

    fn release(&mut self, permit: IdPermit) {
        self.id_locks.release(permit);
        let locks = &self.id_locks;
        self.promoted
            .retain(|from, to| locks.contains(*from) || locks.contains(*to));
    }

    fn resolve(&self, id: PostId) -> PostId {
        let mut current = id;
        while let Some(next) = self.promoted.get(&current) {
            current = *next;
        }
        current
    }
}

/// Per-id serialization of mutations.
#[derive(Default)]
struct IdLocks {
    locks: HashMap<PostId, Arc<AsyncMutex<()>>>,
}

struct IdPermit {
    _guard: OwnedMutexGuard<()>,
    lock: Arc<AsyncMutex<()>>,
}

impl IdPermit {
    async fn acquire(lock: Arc<AsyncMutex<()>>) -> Self {
        let guard = Arc::clone(&lock).lock_owned().await;
        Self {
            _guard: guard,
            lock,
        }
    }
}

enum Claim {
    Acquired(IdPermit),
    Queued(Arc<AsyncMutex<()>>),
}

impl IdLocks {
    fn claim(&mut self, id: PostId) -> Claim {
        let lock = Arc::clone(self.locks.entry(id).or_default());
        match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => Claim::Acquired(IdPermit {
                _guard: guard,
                lock,
            }),
            Err(_) => Claim::Queued(lock),
        }
    }

    /// Move the lock of a provisional id under the id the store assigned, so
    /// later mutations on the committed post queue behind the same lock.
    fn promote(&mut self, from: PostId, to: PostId) {
        if self.locks.contains_key(&to) {
            return;
        }
        if let Some(lock) = self.locks.remove(&from) {
            self.locks.insert(to, lock);
        }
    }

    fn release(&mut self, permit: IdPermit) {
        let IdPermit {
            _guard: guard,
            lock,
        } = permit;
        drop(guard);
        // Only the map and this permit still hold it: nobody is queued.
        if Arc::strong_count(&lock) == 2 {
            self.locks.retain(|_, held| !Arc::ptr_eq(held, &lock));
        }
    }

    fn contains(&self, id: PostId) -> bool {
        self.locks.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

impl PostCache {
    /// Create a cache that spawns its remote steps on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(store: Arc<dyn PostStore>, config: CacheConfig) -> Self {
        Self::with_runtime(store, config, Handle::current())
    }

    pub fn with_runtime(store: Arc<dyn PostStore>, config: CacheConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                runtime,
                state: Mutex::new(CacheState::default()),
                notifier: ChangeNotifier::new(),
            }),
        }
    }

    /// Current posts and status, without waiting.
    ///
    /// Schedules a background refresh when the snapshot is absent or stale.
    pub fn list(&self) -> ListView {
        let (view, generation) = {
            let mut state = self.inner.lock_state("list");
            let view = ListView::from_snapshot(&state.snapshot, state.last_error.as_deref());
            let stale = state
                .snapshot
                .is_stale(OffsetDateTime::now_utc(), self.inner.config.stale_after);
            // A fetch already on its way answers this call too.
            let refetch = stale && !state.refresh_in_flight;
            (view, refetch.then(|| state.begin_refresh()))
        };

        if let Some(generation) = generation {
            let inner = Arc::clone(&self.inner);
            let span = info_span!("post_refresh", generation, trigger = "list");
            self.inner.runtime.spawn(
                async move {
                    if let Err(error) = inner.run_refresh(generation).await {
                        warn!(error = %error, "Background post refresh failed");
                    }
                }
                .instrument(span),
            );
        }

        view
    }

    /// Fetch the list now and wait for it to settle.
    ///
    /// Always issues a new fetch; any fetch still in flight is superseded.
    /// The fetch runs on its own task, so dropping the returned future does
    /// not leave the cache waiting on it.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CacheError> {
        let generation = self.inner.lock_state("refresh").begin_refresh();
        let inner = Arc::clone(&self.inner);
        let span = info_span!("post_refresh", generation, trigger = "explicit");
        let handle = self
            .inner
            .runtime
            .spawn(async move { inner.run_refresh(generation).await }.instrument(span));
        match handle.await {
            Ok(result) => result,
            Err(error) => Err(CacheError::Aborted(error.to_string())),
        }
    }

    /// Posts currently in the snapshot.
    pub fn snapshot(&self) -> Vec<Post> {
        self.inner.lock_state("snapshot").snapshot.posts().to_vec()
    }

    /// Posts whose title or body contains `query`, case-insensitively.
    pub fn search(&self, query: &str) -> Vec<Post> {
        self.inner
            .lock_state("search")
            .snapshot
            .posts()
            .iter()
            .filter(|post| post.matches(query))
            .cloned()
            .collect()
    }

    /// A single post: from the snapshot when present, else from the store.
    pub async fn get(&self, id: PostId) -> Result<Post, CacheError> {
        let (resolved, cached) = {
            let state = self.inner.lock_state("get");
            let resolved = state.resolve(id);
            (resolved, state.snapshot.get(resolved).cloned())
        };
        if let Some(post) = cached {
            return Ok(post);
        }
        if resolved.is_provisional() {
            return Err(CacheError::not_found(resolved));
        }
        match self.inner.store.get_post(resolved).await {
            Ok(post) => Ok(post),
            Err(StoreError::NotFound) => Err(CacheError::not_found(resolved)),
            Err(error) => Err(error.into()),
        }
    }

    /// Notifications for every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SnapshotChange> {
        self.inner.notifier.subscribe()
    }

    /// Mark the snapshot stale; the next `list` refreshes it.
    pub fn invalidate(&self) {
        self.inner.lock_state("invalidate").snapshot.invalidate();
    }

    pub fn is_pending(&self, id: PostId) -> bool {
        let state = self.inner.lock_state("is_pending");
        state.pending.is_pending(state.resolve(id))
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock_state("pending_count").pending.len()
    }

    /// Insert a provisional post at the front and ask the store to create it.
    pub fn create(&self, draft: PostDraft) -> Result<Mutation<Post>, CacheError> {
        draft.validate()?;
        let provisional = self.inner.lock_state("create").issue_provisional_id();

        self.launch(
            provisional,
            "create",
            move |inner, state, id| {
                let post = Post::from_draft(id, &draft);
                state.snapshot.prepend(post.clone());
                state
                    .pending
                    .insert(id, PendingMutation::Create { provisional: post });
                inner.applied("create", id);
                Ok((id, draft))
            },
            |inner, (id, draft)| async move { inner.send_create(id, draft).await },
        )
    }

    /// Replace the post with the same id in place and ask the store to
    /// update it.
    pub fn update(&self, post: Post) -> Result<Mutation<Post>, CacheError> {
        post.validate()?;
        let target = post.id;

        self.launch(
            target,
            "update",
            move |inner, state, id| {
                let index = state
                    .snapshot
                    .position(id)
                    .ok_or_else(|| CacheError::not_found(id))?;
                let applied = Post { id, ..post };
                let pre_image = state.snapshot.replace_at(index, applied.clone());
                state.pending.insert(
                    id,
                    PendingMutation::Update {
                        pre_image,
                        applied: applied.clone(),
                        index,
                    },
                );
                inner.applied("update", id);
                Ok(applied)
            },
            |inner, applied| async move { inner.send_update(applied).await },
        )
    }

    /// Remove the post and ask the store to delete it.
    pub fn delete(&self, id: PostId) -> Result<Mutation<()>, CacheError> {
        self.launch(
            id,
            "delete",
            |inner, state, id| {
                let index = state
                    .snapshot
                    .position(id)
                    .ok_or_else(|| CacheError::not_found(id))?;
                let pre_image = state.snapshot.remove_at(index);
                state
                    .pending
                    .insert(id, PendingMutation::Delete { pre_image, index });
                inner.applied("delete", id);
                Ok(id)
            },
            |inner, id| async move { inner.send_delete(id).await },
        )
    }

    /// Run `stage` now if no other mutation holds `target`, otherwise once
    /// the earlier ones settle; then run `remote` on a spawned task.
    fn launch<P, T, S, R, Fut>(
        &self,
        target: PostId,
        op: &'static str,
        stage: S,
        remote: R,
    ) -> Result<Mutation<T>, CacheError>
    where
        P: Send + 'static,
        T: Send + 'static,
        S: FnOnce(&Inner, &mut CacheState, PostId) -> Result<P, CacheError> + Send + 'static,
        R: FnOnce(Arc<Inner>, P) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let correlation = Uuid::new_v4();
        let inner = Arc::clone(&self.inner);
        let mut state = self.inner.lock_state(op);
        let target = state.resolve(target);
        let span = info_span!("post_mutation", op, %correlation, target = %target);

        let handle = match state.id_locks.claim(target) {
            Claim::Acquired(permit) => {
                let staged = match stage(&*self.inner, &mut state, target) {
                    Ok(staged) => staged,
                    Err(error) => {
                        state.release(permit);
                        return Err(error);
                    }
                };
                state.supersede_refreshes();
                drop(state);
                self.inner.runtime.spawn(
                    async move {
                        let result = remote(Arc::clone(&inner), staged).await;
                        inner.lock_state(op).release(permit);
                        result
                    }
                    .instrument(span),
                )
            }
            Claim::Queued(lock) => {
                drop(state);
                debug!(op, %correlation, post_id = %target, "Mutation queued behind in-flight change");
                self.inner.runtime.spawn(
                    async move {
                        let permit = IdPermit::acquire(lock).await;
                        let staged = {
                            let mut state = inner.lock_state(op);
                            let target = state.resolve(target);
                            let staged = stage(&*inner, &mut state, target);
                            if staged.is_ok() {
                                state.supersede_refreshes();
                            }
                            staged
                        };
                        let result = match staged {
                            Ok(staged) => remote(Arc::clone(&inner), staged).await,
                            Err(error) => Err(error),
                        };
                        inner.lock_state(op).release(permit);
                        result
                    }
                    .instrument(span),
                )
            }
        };

        Ok(Mutation {
            correlation,
            target,
            handle,
        })
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.inner.lock_state("lock_count").id_locks.len()
    }
}

impl Inner {
    fn lock_state(&self, op: &'static str) -> MutexGuard<'_, CacheState> {
        mutex_lock(&self.state, SOURCE, op)
    }

    async fn run_refresh(&self, generation: u64) -> Result<RefreshOutcome, CacheError> {
        let result = self.store.list_posts().await;

        let mut state = self.lock_state("refresh.settle");
        if generation != state.refresh_generation {
            counter!(METRIC_REFRESH_DISCARDED).increment(1);
            debug!(
                generation,
                latest = state.refresh_generation,
                succeeded = result.is_ok(),
                "Discarding superseded post refresh"
            );
            return Ok(RefreshOutcome::Superseded);
        }
        state.refresh_in_flight = false;

        match result {
            Ok(fetched) => {
                let posts = state.pending.rebase(fetched);
                let count = posts.len();
                state.snapshot.install(posts, OffsetDateTime::now_utc());
                state.last_error = None;
                self.notifier.publish(ChangeKind::Refreshed, None);
                info!(generation, posts = count, "Post snapshot refreshed");
                Ok(RefreshOutcome::Applied { posts: count })
            }
            Err(error) => {
                state.last_error = Some(error.to_string());
                warn!(generation, error = %error, "Post refresh failed");
                Err(error.into())
            }
        }
    }

    async fn send_create(&self, provisional: PostId, draft: PostDraft) -> Result<Post, CacheError> {
        let result = self.store.create_post(&draft).await;

        let mut state = self.lock_state("create.settle");
        state.pending.remove(provisional);
        match result {
            Ok(post) => {
                let committed = post.id;
                state.snapshot.commit_provisional(provisional, post.clone());
                if committed != provisional {
                    state.promoted.insert(provisional, committed);
                    state.id_locks.promote(provisional, committed);
                }
                self.after_settle(&mut state);
                self.committed("create", committed);
                Ok(post)
            }
            Err(error) => {
                if let Some(index) = state.snapshot.position(provisional) {
                    state.snapshot.remove_at(index);
                }
                self.after_settle(&mut state);
                self.rolled_back("create", provisional, &error);
                Err(error.into())
            }
        }
    }

    async fn send_update(&self, applied: Post) -> Result<Post, CacheError> {
        let id = applied.id;
        let result = self.store.update_post(id, &applied.to_draft()).await;

        let mut state = self.lock_state("update.settle");
        let pending = state.pending.remove(id);
        match result {
            Ok(server) => {
                let confirmed = confirm(applied, server);
                if let Some(index) = state.snapshot.position(id) {
                    state.snapshot.replace_at(index, confirmed.clone());
                }
                self.after_settle(&mut state);
                self.committed("update", id);
                Ok(confirmed)
            }
            Err(error) => {
                if let Some(PendingMutation::Update {
                    pre_image, index, ..
                }) = pending
                {
                    state.snapshot.restore(index, pre_image);
                }
                self.after_settle(&mut state);
                self.rolled_back("update", id, &error);
                Err(error.into())
            }
        }
    }

    async fn send_delete(&self, id: PostId) -> Result<(), CacheError> {
        let result = self.store.delete_post(id).await;

        let mut state = self.lock_state("delete.settle");
        let pending = state.pending.remove(id);
        match result {
            Ok(()) => {
                self.after_settle(&mut state);
                self.committed("delete", id);
                Ok(())
            }
            Err(error) => {
                if let Some(PendingMutation::Delete { pre_image, index }) = pending {
                    state.snapshot.restore(index, pre_image);
                }
                self.after_settle(&mut state);
                self.rolled_back("delete", id, &error);
                Err(error.into())
            }
        }
    }

    fn after_settle(&self, state: &mut CacheState) {
        if self.config.invalidate_after_mutation {
            state.snapshot.invalidate();
        }
    }

    fn applied(&self, op: &'static str, id: PostId) {
        counter!(METRIC_OPTIMISTIC, "op" => op).increment(1);
        debug!(op, post_id = %id, "Applied optimistic change");
        self.notifier.publish(ChangeKind::Applied, Some(id));
    }

    fn committed(&self, op: &'static str, id: PostId) {
        info!(op, post_id = %id, "Store confirmed optimistic change");
        self.notifier.publish(ChangeKind::Committed, Some(id));
    }

    fn rolled_back(&self, op: &'static str, id: PostId, error: &StoreError) {
        counter!(METRIC_ROLLBACK, "op" => op).increment(1);
        warn!(op, post_id = %id, error = %error, "Rolled back optimistic change");
        self.notifier.publish(ChangeKind::RolledBack, Some(id));
    }
}

/// The store's answer wins for fields it echoes; pass-through fields it
/// omits keep their local value.
fn confirm(applied: Post, server: Post) -> Post {
    Post {
        id: applied.id,
        title: server.title,
        body: server.body,
        user_id: server.user_id.or(applied.user_id),
        created_at: server.created_at.or(applied.created_at),
        updated_at: server.updated_at.or(applied.updated_at),
    }
}
