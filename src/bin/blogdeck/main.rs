//! blogdeck: dashboard client for a REST post store.
#![deny(clippy::all, clippy::pedantic)]

mod handlers;
mod io;
mod print;

use std::{process, sync::Arc};

use blogdeck::{
    application::error::AppError,
    cache::{CacheConfig, PostCache},
    config,
    infra::{error::InfraError, http_store::HttpPostStore, telemetry},
};
use tracing::{
    Level,
    dispatcher::{self, Dispatch},
    error,
};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "{}", error.presentation_message());
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "{}", error.presentation_message());
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let store = HttpPostStore::from_settings(&settings.api)
        .map_err(|err| InfraError::http_client(err.to_string()))?;
    let cache = PostCache::new(Arc::new(store), CacheConfig::from(&settings.cache));

    handlers::handle(&cache, cli_args.command).await
}
