#![deny(clippy::all, clippy::pedantic)]

use blogdeck::application::error::AppError;
use blogdeck::application::feed::FeedService;
use blogdeck::application::forms::PostForm;
use blogdeck::cache::{PostCache, RefreshOutcome};
use blogdeck::config::{Command, CreateArgs, UpdateArgs};
use blogdeck::domain::posts::{Post, PostId};
use serde::Serialize;
use tracing::{debug, info};

use crate::io::read_body;
use crate::print::print_json;

#[derive(Debug, Serialize)]
struct Deleted {
    deleted: PostId,
}

pub async fn handle(cache: &PostCache, command: Command) -> Result<(), AppError> {
    match command {
        Command::Home => home(cache).await,
        Command::List { search } => list(cache, search.as_deref().unwrap_or_default()).await,
        Command::Get { id } => get(cache, PostId(id)).await,
        Command::Create(args) => create(cache, args).await,
        Command::Update(args) => update(cache, args).await,
        Command::Delete { id } => delete(cache, PostId(id)).await,
    }
}

async fn load_posts(cache: &PostCache) -> Result<(), AppError> {
    match cache.refresh().await? {
        RefreshOutcome::Applied { posts } => debug!(posts, "Post list loaded"),
        RefreshOutcome::Superseded => debug!("Post list refresh superseded"),
    }
    Ok(())
}

async fn home(cache: &PostCache) -> Result<(), AppError> {
    load_posts(cache).await?;
    let view = FeedService::new(cache.clone()).home();
    print_json(&view)
}

async fn list(cache: &PostCache, query: &str) -> Result<(), AppError> {
    load_posts(cache).await?;
    let view = FeedService::new(cache.clone()).admin(query);
    print_json(&view)
}

async fn get(cache: &PostCache, id: PostId) -> Result<(), AppError> {
    let post = FeedService::new(cache.clone()).detail(id).await?;
    print_json(&post)
}

async fn create(cache: &PostCache, args: CreateArgs) -> Result<(), AppError> {
    let body = read_body(args.body)?;
    let draft = PostForm::new(args.title, body).into_draft(args.user_id)?;

    let mutation = cache.create(draft)?;
    debug!(
        correlation = %mutation.correlation(),
        provisional = %mutation.target(),
        "Create submitted"
    );
    let post = mutation.wait().await?;
    info!(post_id = %post.id, "Post created");
    print_json(&post)
}

async fn update(cache: &PostCache, args: UpdateArgs) -> Result<(), AppError> {
    let body = read_body(args.body)?;
    let form = PostForm::new(args.title, body);
    let errors = form.validate();
    if !errors.is_empty() {
        return Err(errors.into());
    }

    load_posts(cache).await?;
    let current = cache.get(PostId(args.id)).await?;
    let edited = Post {
        title: form.title,
        body: form.body,
        ..current
    };

    let mutation = cache.update(edited)?;
    debug!(correlation = %mutation.correlation(), post_id = %mutation.target(), "Update submitted");
    let post = mutation.wait().await?;
    info!(post_id = %post.id, "Post updated");
    print_json(&post)
}

async fn delete(cache: &PostCache, id: PostId) -> Result<(), AppError> {
    load_posts(cache).await?;

    let mutation = cache.delete(id)?;
    debug!(correlation = %mutation.correlation(), post_id = %id, "Delete submitted");
    mutation.wait().await?;
    info!(post_id = %id, "Post deleted");
    print_json(&Deleted { deleted: id })
}
