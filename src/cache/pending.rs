//! Optimistic mutations awaiting confirmation from the store.
//!
//! An id with an entry here is pending reconciliation; removing the entry is
//! what commits (or rolls back) the change. Each entry keeps the pre-image
//! needed to restore the snapshot verbatim.

use std::collections::{HashMap, HashSet};

use crate::domain::posts::{Post, PostId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingMutation {
    /// Provisional post shown at the front of the list.
    Create { provisional: Post },
    /// `applied` is what the snapshot shows; `pre_image` sat at `index`.
    Update {
        pre_image: Post,
        applied: Post,
        index: usize,
    },
    /// `pre_image` was removed from `index`.
    Delete { pre_image: Post, index: usize },
}

#[derive(Debug, Default)]
pub(crate) struct PendingSet {
    entries: HashMap<PostId, PendingMutation>,
}

impl PendingSet {
    pub(crate) fn insert(&mut self, id: PostId, mutation: PendingMutation) {
        self.entries.insert(id, mutation);
    }

    pub(crate) fn remove(&mut self, id: PostId) -> Option<PendingMutation> {
        self.entries.remove(&id)
    }

    pub(crate) fn is_pending(&self, id: PostId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Lay pending mutations over a freshly fetched list.
    ///
    /// Duplicate ids in the fetched list collapse to their first occurrence.
    /// Provisional creations go first, newest first.
    pub(crate) fn rebase(&self, fetched: Vec<Post>) -> Vec<Post> {
        let mut seen = HashSet::new();
        let mut posts: Vec<Post> = fetched
            .into_iter()
            .filter(|post| seen.insert(post.id))
            .collect();

        for mutation in self.entries.values() {
            match mutation {
                PendingMutation::Update { applied, .. } => {
                    if let Some(slot) = posts.iter_mut().find(|post| post.id == applied.id) {
                        *slot = applied.clone();
                    }
                }
                PendingMutation::Delete { pre_image, .. } => {
                    posts.retain(|post| post.id != pre_image.id);
                }
                PendingMutation::Create { .. } => {}
            }
        }

        let mut provisional: Vec<&Post> = self
            .entries
            .values()
            .filter_map(|mutation| match mutation {
                PendingMutation::Create { provisional } => Some(provisional),
                _ => None,
            })
            .collect();
        // Provisional ids count down, so the newest sorts first.
        provisional.sort_by_key(|post| post.id);

        provisional.into_iter().cloned().chain(posts).collect()
    }
}
