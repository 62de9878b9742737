//! Cache configuration.
//!
//! Controls snapshot freshness and post-mutation invalidation via the
//! `[cache]` section of `blogdeck.toml`.

use std::time::Duration;

const DEFAULT_STALE_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which `list` schedules a background refresh.
    pub stale_after: Duration,
    /// Mark the snapshot stale once a mutation settles, so the next `list`
    /// re-reads the store.
    pub invalidate_after_mutation: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            invalidate_after_mutation: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            stale_after: settings.stale_after,
            invalidate_after_mutation: settings.invalidate_after_mutation,
        }
    }
}
