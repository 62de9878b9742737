//! Snapshot change notifications.
//!
//! Views subscribe once and re-render whenever the epoch moves; the change
//! itself only says what happened, the posts are read from the cache.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::posts::PostId;

/// Monotonic counter ordering snapshot changes within one cache.
pub type Epoch = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Nothing has happened yet.
    Initial,
    /// A list fetch replaced the snapshot.
    Refreshed,
    /// An optimistic edit was applied locally.
    Applied,
    /// The store confirmed an optimistic edit.
    Committed,
    /// The store rejected an optimistic edit and it was undone.
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotChange {
    pub epoch: Epoch,
    pub kind: ChangeKind,
    pub target: Option<PostId>,
}

pub(crate) struct ChangeNotifier {
    sender: watch::Sender<SnapshotChange>,
    epoch_counter: AtomicU64,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(SnapshotChange {
            epoch: 0,
            kind: ChangeKind::Initial,
            target: None,
        });
        Self {
            sender,
            epoch_counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SnapshotChange> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, kind: ChangeKind, target: Option<PostId>) -> Epoch {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        debug!(change_epoch = epoch, change_kind = ?kind, target = ?target, "Snapshot changed");
        self.sender.send_replace(SnapshotChange {
            epoch,
            kind,
            target,
        });
        epoch
    }
}
