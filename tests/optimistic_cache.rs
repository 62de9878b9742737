//! Behaviour of the optimistic cache while remote calls are in flight.
//!
//! The store double only answers when a test tells it to, so every test can
//! look at the snapshot between the local and the remote step.

mod support;

use blogdeck::application::store::StoreError;
use blogdeck::cache::{
    CacheConfig, CacheError, ChangeKind, ListStatus, PostCache, RefreshOutcome,
};
use blogdeck::domain::posts::{Post, PostDraft, PostId};

use support::{channel_store, ids, loaded_cache, loaded_cache_with, post, posts, settle};

fn down() -> StoreError {
    StoreError::unavailable("connection reset")
}

#[tokio::test]
async fn create_is_visible_before_the_store_answers() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2])).await;

    let mutation = cache
        .create(PostDraft::new("Fresh", "Brand new content"))
        .expect("valid draft");
    let provisional = mutation.target();
    assert!(provisional.is_provisional());

    let snapshot = cache.snapshot();
    assert_eq!(ids(&snapshot), vec![provisional.get(), 1, 2]);
    assert_eq!(snapshot[0].title, "Fresh");
    assert!(cache.is_pending(provisional));

    let (draft, reply) = calls.next().await.into_create();
    assert_eq!(draft.title, "Fresh");
    let mut committed = post(101, "Fresh");
    committed.body = "Brand new content".to_string();
    reply.send(Ok(committed.clone())).expect("create waiting");

    let created = mutation.wait().await.expect("created");
    assert_eq!(created, committed);
    assert_eq!(ids(&cache.snapshot()), vec![101, 1, 2]);
    assert!(!cache.is_pending(provisional));
    assert_eq!(cache.pending_count(), 0);
}

#[tokio::test]
async fn failed_create_restores_the_exact_snapshot() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2, 3])).await;
    let before = cache.snapshot();

    let mutation = cache
        .create(PostDraft::new("Doomed", "This one will not make it"))
        .expect("valid draft");
    assert_eq!(cache.snapshot().len(), 4);

    let (_, reply) = calls.next().await.into_create();
    reply.send(Err(down())).expect("create waiting");

    let err = mutation.wait().await.expect_err("create rejected");
    assert!(err.is_remote());
    assert_eq!(cache.snapshot(), before);
    assert_eq!(cache.pending_count(), 0);
}

#[tokio::test]
async fn invalid_draft_never_reaches_the_store() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;
    let before = cache.snapshot();

    let err = cache
        .create(PostDraft::new("  ", "content"))
        .expect_err("blank title");
    assert!(matches!(err, CacheError::Validation { .. }));

    let mut blank_body = post(1, "still titled");
    blank_body.body = String::new();
    let err = cache.update(blank_body).expect_err("blank body");
    assert!(matches!(err, CacheError::Validation { .. }));

    assert_eq!(cache.snapshot(), before);
    calls.assert_idle().await;
}

#[tokio::test]
async fn update_applies_in_place_and_reverts_on_failure() {
    let (cache, mut calls) = loaded_cache(posts(&[4, 5, 6])).await;
    let original = cache.snapshot()[1].clone();

    let mutation = cache
        .update(Post {
            title: "A".to_string(),
            ..original.clone()
        })
        .expect("known id");

    let snapshot = cache.snapshot();
    assert_eq!(ids(&snapshot), vec![4, 5, 6]);
    assert_eq!(snapshot[1].title, "A");

    let (id, fields, reply) = calls.next().await.into_update();
    assert_eq!(id, PostId(5));
    assert_eq!(fields.title, "A");
    reply.send(Err(down())).expect("update waiting");

    mutation.wait().await.expect_err("update rejected");
    let snapshot = cache.snapshot();
    assert_eq!(ids(&snapshot), vec![4, 5, 6]);
    assert_eq!(snapshot[1], original);
}

#[tokio::test]
async fn update_of_unknown_post_is_not_found() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;

    let err = cache.update(post(9, "ghost")).expect_err("unknown id");
    assert!(matches!(err, CacheError::NotFound { id: PostId(9) }));
    calls.assert_idle().await;
}

#[tokio::test]
async fn delete_removes_and_reinserts_at_original_index() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2, 3, 4])).await;
    let removed = cache.snapshot()[2].clone();

    let mutation = cache.delete(PostId(3)).expect("known id");
    assert_eq!(ids(&cache.snapshot()), vec![1, 2, 4]);

    let (id, reply) = calls.next().await.into_delete();
    assert_eq!(id, PostId(3));
    reply.send(Err(down())).expect("delete waiting");

    mutation.wait().await.expect_err("delete rejected");
    let snapshot = cache.snapshot();
    assert_eq!(ids(&snapshot), vec![1, 2, 3, 4]);
    assert_eq!(snapshot[2], removed);
}

#[tokio::test]
async fn delete_commits_when_store_agrees() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2])).await;

    let mutation = cache.delete(PostId(1)).expect("known id");
    let (_, reply) = calls.next().await.into_delete();
    reply.send(Ok(())).expect("delete waiting");

    mutation.wait().await.expect("deleted");
    assert_eq!(ids(&cache.snapshot()), vec![2]);
    assert!(matches!(
        cache.delete(PostId(1)),
        Err(CacheError::NotFound { .. })
    ));
}

#[tokio::test]
async fn second_update_waits_and_survives_first_rollback() {
    let (cache, mut calls) = loaded_cache(posts(&[7])).await;
    let original = cache.snapshot()[0].clone();

    let first = cache
        .update(Post {
            title: "first".to_string(),
            ..original.clone()
        })
        .expect("first update");
    let second = cache
        .update(Post {
            title: "second".to_string(),
            ..original.clone()
        })
        .expect("second update");

    // Only the first edit is applied while it is in flight.
    let (_, fields, reply) = calls.next().await.into_update();
    assert_eq!(fields.title, "first");
    calls.assert_idle().await;
    assert_eq!(cache.snapshot()[0].title, "first");

    reply.send(Err(down())).expect("first waiting");
    first.wait().await.expect_err("first rejected");

    let (_, fields, reply) = calls.next().await.into_update();
    assert_eq!(fields.title, "second");
    assert_eq!(cache.snapshot()[0].title, "second");
    reply
        .send(Ok(post(7, "second")))
        .expect("second waiting");

    second.wait().await.expect("second committed");
    assert_eq!(cache.snapshot()[0].title, "second");
}

#[tokio::test]
async fn rollback_of_later_update_restores_earlier_commit() {
    let (cache, mut calls) = loaded_cache(posts(&[7])).await;
    let original = cache.snapshot()[0].clone();

    let first = cache
        .update(Post {
            title: "first".to_string(),
            ..original.clone()
        })
        .expect("first update");
    let second = cache
        .update(Post {
            title: "second".to_string(),
            ..original.clone()
        })
        .expect("second update");

    let (_, _, reply) = calls.next().await.into_update();
    reply.send(Ok(post(7, "first"))).expect("first waiting");
    first.wait().await.expect("first committed");

    let (_, _, reply) = calls.next().await.into_update();
    reply.send(Err(down())).expect("second waiting");
    second.wait().await.expect_err("second rejected");

    assert_eq!(cache.snapshot()[0].title, "first");
}

#[tokio::test]
async fn mutations_on_different_ids_run_independently() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2])).await;

    let one = cache.delete(PostId(1)).expect("delete 1");
    let two = cache.delete(PostId(2)).expect("delete 2");
    assert!(cache.snapshot().is_empty());

    let (first_id, first_reply) = calls.next().await.into_delete();
    let (second_id, second_reply) = calls.next().await.into_delete();
    assert_ne!(first_id, second_id);

    // Settle in reverse issue order.
    second_reply.send(Err(down())).expect("waiting");
    first_reply.send(Ok(())).expect("waiting");

    let (ok, failed) = if first_id == PostId(1) {
        (one, two)
    } else {
        (two, one)
    };
    ok.wait().await.expect("committed");
    failed.wait().await.expect_err("rolled back");
    assert_eq!(ids(&cache.snapshot()), vec![second_id.get()]);
}

#[tokio::test]
async fn only_the_latest_list_is_applied() {
    let (store, mut calls) = channel_store();
    let cache = PostCache::new(store, CacheConfig::default());

    let view = cache.list();
    assert_eq!(view.status, ListStatus::Loading);
    let older_reply = calls.next().await.into_list();

    let newer = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    let newer_reply = calls.next().await.into_list();

    let mut changes = cache.subscribe();
    newer_reply.send(Ok(posts(&[2, 3]))).expect("newer waiting");
    assert_eq!(
        newer.await.expect("task").expect("applied"),
        RefreshOutcome::Applied { posts: 2 }
    );
    changes.changed().await.expect("cache alive");
    assert_eq!(changes.borrow_and_update().kind, ChangeKind::Refreshed);

    older_reply.send(Ok(posts(&[1]))).expect("older waiting");
    settle().await;

    assert_eq!(ids(&cache.snapshot()), vec![2, 3]);
    assert!(!changes.has_changed().expect("cache alive"));
    assert_eq!(cache.list().status, ListStatus::Ready);
}

#[tokio::test]
async fn repeated_list_calls_share_one_fetch() {
    let (store, mut calls) = channel_store();
    let cache = PostCache::new(store, CacheConfig::default());

    for _ in 0..5 {
        assert_eq!(cache.list().status, ListStatus::Loading);
    }
    let reply = calls.next().await.into_list();
    calls.assert_idle().await;

    reply.send(Ok(posts(&[1, 2]))).expect("list waiting");
    settle().await;

    let view = cache.list();
    assert_eq!(view.status, ListStatus::Ready);
    assert_eq!(ids(&view.posts), vec![1, 2]);
    calls.assert_idle().await;
}

#[tokio::test]
async fn list_read_before_a_delete_cannot_resurrect_it() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2, 3])).await;

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    let stale_list = calls.next().await.into_list();

    let mutation = cache.delete(PostId(2)).expect("delete");
    let (_, reply) = calls.next().await.into_delete();
    reply.send(Ok(())).expect("delete waiting");
    mutation.wait().await.expect("deleted");
    assert_eq!(ids(&cache.snapshot()), vec![1, 3]);

    stale_list
        .send(Ok(posts(&[1, 2, 3])))
        .expect("list waiting");
    assert_eq!(
        refresh.await.expect("task").expect("discarded"),
        RefreshOutcome::Superseded
    );
    assert_eq!(ids(&cache.snapshot()), vec![1, 3]);
}

#[tokio::test]
async fn list_read_before_an_update_cannot_revert_it() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2])).await;

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    let stale_list = calls.next().await.into_list();

    let mutation = cache.update(post(1, "confirmed edit")).expect("update");
    let (_, _, reply) = calls.next().await.into_update();
    reply
        .send(Ok(post(1, "confirmed edit")))
        .expect("update waiting");
    mutation.wait().await.expect("updated");

    stale_list.send(Ok(posts(&[1, 2]))).expect("list waiting");
    assert_eq!(
        refresh.await.expect("task").expect("discarded"),
        RefreshOutcome::Superseded
    );
    assert_eq!(cache.snapshot()[0].title, "confirmed edit");
}

#[tokio::test]
async fn list_read_before_a_create_keeps_the_committed_post() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    let stale_list = calls.next().await.into_list();

    let mutation = cache
        .create(PostDraft::new("Fresh", "Brand new content"))
        .expect("create");
    let (_, reply) = calls.next().await.into_create();
    reply.send(Ok(post(101, "Fresh"))).expect("create waiting");
    mutation.wait().await.expect("created");

    stale_list.send(Ok(posts(&[1]))).expect("list waiting");
    assert_eq!(
        refresh.await.expect("task").expect("discarded"),
        RefreshOutcome::Superseded
    );
    assert_eq!(ids(&cache.snapshot()), vec![101, 1]);
}

#[tokio::test]
async fn superseded_refresh_is_dropped_even_when_it_lands_first() {
    let (store, mut calls) = channel_store();
    let cache = PostCache::new(store, CacheConfig::default());

    let older = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    let older_reply = calls.next().await.into_list();
    let newer = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    let newer_reply = calls.next().await.into_list();

    older_reply.send(Err(down())).expect("older waiting");
    assert_eq!(
        older.await.expect("task").expect("error discarded"),
        RefreshOutcome::Superseded
    );
    assert_eq!(cache.list().status, ListStatus::Loading);

    newer_reply.send(Ok(posts(&[5]))).expect("newer waiting");
    assert_eq!(
        newer.await.expect("task").expect("applied"),
        RefreshOutcome::Applied { posts: 1 }
    );
    assert_eq!(ids(&cache.snapshot()), vec![5]);
}

#[tokio::test]
async fn failed_first_load_reports_failure() {
    let (store, mut calls) = channel_store();
    let cache = PostCache::new(store, CacheConfig::default());

    assert_eq!(cache.list().status, ListStatus::Loading);
    calls
        .next()
        .await
        .into_list()
        .send(Err(down()))
        .expect("list waiting");
    settle().await;

    let view = cache.list();
    assert_eq!(view.status, ListStatus::Failed);
    assert!(view.error.is_some());
    assert!(view.posts.is_empty());
    // The failed view is still stale, so it retries.
    calls.next().await.into_list();
}

#[tokio::test]
async fn fresh_snapshot_does_not_refetch() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;

    let view = cache.list();
    assert_eq!(view.status, ListStatus::Ready);
    assert!(view.fetched_at.is_some());
    calls.assert_idle().await;
}

#[tokio::test]
async fn refresh_reapplies_pending_mutations() {
    let (cache, mut calls) = loaded_cache(posts(&[1, 2, 3])).await;

    let update = cache
        .update(post(2, "local edit"))
        .expect("update pending");
    let (_, _, update_reply) = calls.next().await.into_update();
    let delete = cache.delete(PostId(3)).expect("delete pending");
    let (_, delete_reply) = calls.next().await.into_delete();
    let create = cache
        .create(PostDraft::new("Draft", "Unsaved content"))
        .expect("create pending");
    let provisional = create.target();
    let (_, create_reply) = calls.next().await.into_create();

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    calls
        .next()
        .await
        .into_list()
        .send(Ok(vec![
            post(1, "server one"),
            post(2, "stale server copy"),
            post(3, "server three"),
            post(4, "server four"),
        ]))
        .expect("list waiting");
    refresh.await.expect("task").expect("refreshed");

    let snapshot = cache.snapshot();
    assert_eq!(ids(&snapshot), vec![provisional.get(), 1, 2, 4]);
    assert_eq!(snapshot[2].title, "local edit");
    assert_eq!(snapshot[1].title, "server one");

    update_reply
        .send(Ok(post(2, "local edit")))
        .expect("update waiting");
    delete_reply.send(Ok(())).expect("delete waiting");
    create_reply
        .send(Ok(post(101, "Draft")))
        .expect("create waiting");
    update.wait().await.expect("update");
    delete.wait().await.expect("delete");
    create.wait().await.expect("create");

    assert_eq!(ids(&cache.snapshot()), vec![101, 1, 2, 4]);
    assert_eq!(cache.pending_count(), 0);
}

#[tokio::test]
async fn mutation_on_provisional_id_follows_the_committed_id() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;

    let create = cache
        .create(PostDraft::new("Draft", "Initial content"))
        .expect("create");
    let provisional = create.target();
    let edit = cache
        .update(Post {
            title: "Edited before commit".to_string(),
            ..cache.snapshot()[0].clone()
        })
        .expect("queued update");

    let (_, reply) = calls.next().await.into_create();
    calls.assert_idle().await;
    reply.send(Ok(post(101, "Draft"))).expect("create waiting");
    create.wait().await.expect("created");

    let (id, fields, reply) = calls.next().await.into_update();
    assert_eq!(id, PostId(101));
    assert_eq!(fields.title, "Edited before commit");
    assert_eq!(cache.snapshot()[0].title, "Edited before commit");
    reply
        .send(Ok(post(101, "Edited before commit")))
        .expect("update waiting");

    let updated = edit.wait().await.expect("updated");
    assert_eq!(updated.id, PostId(101));
    assert_eq!(ids(&cache.snapshot()), vec![101, 1]);
    assert!(!cache.is_pending(provisional));
}

#[tokio::test]
async fn subscribers_see_apply_then_rollback() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;
    let mut changes = cache.subscribe();

    let mutation = cache.delete(PostId(1)).expect("delete");
    changes.changed().await.expect("cache alive");
    {
        let change = changes.borrow_and_update();
        assert_eq!(change.kind, ChangeKind::Applied);
        assert_eq!(change.target, Some(PostId(1)));
    }

    let (_, reply) = calls.next().await.into_delete();
    reply.send(Err(down())).expect("delete waiting");
    mutation.wait().await.expect_err("rolled back");

    changes.changed().await.expect("cache alive");
    let change = *changes.borrow_and_update();
    assert_eq!(change.kind, ChangeKind::RolledBack);
    assert_eq!(change.target, Some(PostId(1)));
}

#[tokio::test]
async fn settled_mutation_marks_snapshot_stale_when_configured() {
    let config = CacheConfig {
        invalidate_after_mutation: true,
        ..CacheConfig::default()
    };
    let (cache, mut calls) = loaded_cache_with(posts(&[1, 2]), config).await;

    let mutation = cache.delete(PostId(2)).expect("delete");
    let (_, reply) = calls.next().await.into_delete();
    reply.send(Ok(())).expect("delete waiting");
    mutation.wait().await.expect("deleted");

    let view = cache.list();
    assert_eq!(view.status, ListStatus::Ready);
    assert_eq!(ids(&view.posts), vec![1]);
    calls.next().await.into_list();
}

#[tokio::test]
async fn get_prefers_snapshot_then_store() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;

    let cached = cache.get(PostId(1)).await.expect("in snapshot");
    assert_eq!(cached.id, PostId(1));
    calls.assert_idle().await;

    let lookup = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(PostId(42)).await }
    });
    match calls.next().await {
        support::StoreCall::Get { id, reply } => {
            assert_eq!(id, PostId(42));
            reply.send(Err(StoreError::NotFound)).expect("get waiting");
        }
        other => panic!("expected a get call, got {other:?}"),
    }
    let err = lookup.await.expect("task").expect_err("missing");
    assert!(matches!(err, CacheError::NotFound { id: PostId(42) }));
    assert_eq!(ids(&cache.snapshot()), vec![1]);
}

#[tokio::test]
async fn search_matches_title_or_body_case_insensitively() {
    let mut rust = post(1, "Learning Rust");
    rust.body = "ownership".to_string();
    let mut other = post(2, "Gardening");
    other.body = "Tomatoes and RUSTIC fences".to_string();
    let (cache, _calls) = loaded_cache(vec![rust, other, post(3, "Cooking")]).await;

    assert_eq!(ids(&cache.search("rust")), vec![1, 2]);
    assert_eq!(ids(&cache.search("OWNERSHIP")), vec![1]);
    assert_eq!(cache.search("").len(), 3);
}

#[tokio::test]
async fn mutation_queued_on_failed_create_is_not_found() {
    let (cache, mut calls) = loaded_cache(posts(&[1])).await;

    let create = cache
        .create(PostDraft::new("Draft", "Initial content"))
        .expect("create");
    let provisional = create.target();
    let delete = cache.delete(provisional).expect("queued delete");

    let (_, reply) = calls.next().await.into_create();
    reply.send(Err(down())).expect("create waiting");
    create.wait().await.expect_err("create rejected");

    let err = delete.wait().await.expect_err("nothing left to delete");
    assert!(matches!(err, CacheError::NotFound { id } if id == provisional));
    assert_eq!(ids(&cache.snapshot()), vec![1]);
    calls.assert_idle().await;
}
