//! Application services between the views and the cache.

pub mod error;
pub mod feed;
pub mod forms;
pub mod store;
