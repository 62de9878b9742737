//! Optimistic post cache.
//!
//! Holds the last known list of posts, applies speculative local edits
//! before the store confirms them, and reconciles with the store afterwards:
//!
//! - **Snapshot**: the ordered posts views render from
//! - **Pending set**: optimistic edits with the pre-images that undo them
//! - **Notifications**: a watch channel that ticks on every snapshot change
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! stale_after_seconds = 60
//! invalidate_after_mutation = true
//! ```

mod config;
mod error;
mod events;
mod lock;
mod pending;
mod post_cache;
mod snapshot;

pub use config::CacheConfig;
pub use error::CacheError;
pub use events::{ChangeKind, Epoch, SnapshotChange};
pub use post_cache::{Mutation, PostCache, RefreshOutcome};
pub use snapshot::{ListStatus, ListView, Snapshot};
