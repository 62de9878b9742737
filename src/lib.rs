//! Blog dashboard client: an optimistic post cache over a REST post store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
